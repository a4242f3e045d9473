// ABOUTME: Streaming core between parameter changes and rendered log lines
//
// Key components:
// - debounce: turns fast filter edits into one committed term after a quiet period
// - multicast: shares one upstream connection per tuple, with replay for late joiners
// - session: exactly one live subscription per viewer, replaced when the tuple changes
// - highlight: wraps filter matches in display markers

pub mod debounce;
pub mod highlight;
pub mod multicast;
pub mod session;

pub use debounce::DebounceFilter;
pub use highlight::{decorate, FilterError, Highlighter, HIGHLIGHT_END, HIGHLIGHT_START};
pub use multicast::{MulticastHub, Multicaster, Subscription, SubscriptionEvent};
pub use session::{OpenOutcome, SessionEvent, SessionId, SessionSlot, SessionStatus, StreamSession};
