// ABOUTME: Stream session owning one subscription for one resolved parameter tuple
//
// A SessionSlot holds at most one session. Opening a different tuple cancels the
// current session before the new one subscribes; opening the same tuple reuses it.
// A cancelled session drops its subscription immediately, so nothing it received
// afterwards can reach the owner.

use super::multicast::{MulticastHub, Subscription, SubscriptionEvent};
use crate::models::{LogLine, ParameterTuple};
use crate::source::SourceError;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique identifier for an opened session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Subscribed and delivering
    Open,
    /// Source finished; everything it had was delivered
    Ended,
    /// Source failed; terminal, never retried by the session
    Failed,
    /// Superseded or disposed by the owner
    Cancelled,
}

impl SessionStatus {
    /// Whether opening the same tuple again should keep this session
    pub const fn is_reusable(self) -> bool {
        matches!(self, Self::Open | Self::Ended)
    }
}

/// What a session hands to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Line(LogLine),
    /// The source has no more lines for this tuple
    CaughtUp,
    /// Surfaced once; the session is terminal afterwards
    Failed(SourceError),
}

#[derive(Debug)]
pub struct StreamSession {
    id: SessionId,
    tuple: ParameterTuple,
    subscription: Option<Subscription>,
    status: SessionStatus,
}

impl StreamSession {
    /// Subscribe to the shared stream for `tuple`
    pub fn open(tuple: ParameterTuple, hub: &MulticastHub) -> Self {
        let id = SessionId::new();
        let subscription = hub.subscribe(&tuple);
        info!(
            session = %id,
            tuple = %tuple,
            replayed = subscription.replayed(),
            "Stream session opened"
        );

        Self {
            id,
            tuple,
            subscription: Some(subscription),
            status: SessionStatus::Open,
        }
    }

    pub const fn id(&self) -> SessionId {
        self.id
    }

    pub const fn tuple(&self) -> &ParameterTuple {
        &self.tuple
    }

    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Whether the session can still deliver events
    pub const fn is_delivering(&self) -> bool {
        matches!(self.status, SessionStatus::Open)
    }

    /// Next event, or `None` once the session is no longer delivering.
    ///
    /// Cancel-safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        let subscription = self.subscription.as_mut()?;
        let event = match subscription.recv().await {
            Some(event) => event,
            None => {
                self.finish(SessionStatus::Ended);
                return Some(SessionEvent::CaughtUp);
            }
        };

        Some(match event {
            SubscriptionEvent::Line(line) => SessionEvent::Line(line),
            SubscriptionEvent::Ended => {
                debug!(session = %self.id, "Stream session caught up");
                self.finish(SessionStatus::Ended);
                SessionEvent::CaughtUp
            }
            SubscriptionEvent::Failed(error) => {
                warn!(session = %self.id, error = %error, "Stream session failed");
                self.finish(SessionStatus::Failed);
                SessionEvent::Failed(error)
            }
        })
    }

    /// Stop delivering and release the subscription
    pub fn cancel(&mut self) {
        if self.status == SessionStatus::Open {
            info!(session = %self.id, tuple = %self.tuple, "Stream session cancelled");
            self.status = SessionStatus::Cancelled;
        }
        self.subscription = None;
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.subscription = None;
    }
}

/// Result of asking a slot to open a tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// The current session already serves this tuple
    Reused(SessionId),
    /// A new session was opened, replacing `replaced` if there was one
    Opened {
        id: SessionId,
        replaced: Option<SessionId>,
    },
}

/// Holds the single session of one viewer
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Option<StreamSession>,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `tuple`, replacing the current session if it serves something else
    pub fn open(&mut self, tuple: ParameterTuple, hub: &MulticastHub) -> OpenOutcome {
        if let Some(current) = &self.current {
            if current.tuple() == &tuple && current.status().is_reusable() {
                debug!(session = %current.id(), "Reusing stream session for unchanged tuple");
                return OpenOutcome::Reused(current.id());
            }
        }

        // Old subscription is released before the new one exists
        let replaced = self.cancel();
        let session = StreamSession::open(tuple, hub);
        let id = session.id();
        self.current = Some(session);

        OpenOutcome::Opened { id, replaced }
    }

    /// Cancel and remove the current session
    pub fn cancel(&mut self) -> Option<SessionId> {
        self.current.take().map(|mut session| {
            session.cancel();
            session.id()
        })
    }

    pub const fn current(&self) -> Option<&StreamSession> {
        self.current.as_ref()
    }

    pub fn is_delivering(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(StreamSession::is_delivering)
    }

    /// Next event from the current session, tagged with its id
    pub async fn next_event(&mut self) -> Option<(SessionId, SessionEvent)> {
        let session = self.current.as_mut()?;
        let id = session.id();
        session.next_event().await.map(|event| (id, event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StepTarget;
    use crate::source::ManualLogSource;
    use std::sync::Arc;

    fn tuple(container: &str, filter: &str) -> ParameterTuple {
        ParameterTuple::new(&StepTarget::new("argo", "pl", "step"), container, filter, 50)
    }

    fn setup() -> (ManualLogSource, MulticastHub) {
        let source = ManualLogSource::new();
        let hub = MulticastHub::new(Arc::new(source.clone()), None);
        (source, hub)
    }

    #[tokio::test]
    async fn test_same_tuple_is_reused() {
        let (source, hub) = setup();
        let mut slot = SessionSlot::new();

        let OpenOutcome::Opened { id, replaced } = slot.open(tuple("main", ""), &hub) else {
            panic!("expected a new session");
        };
        assert_eq!(replaced, None);
        assert_eq!(slot.open(tuple("main", ""), &hub), OpenOutcome::Reused(id));
        assert_eq!(source.open_count(), 1);
    }

    #[tokio::test]
    async fn test_different_tuple_cancels_previous_first() {
        let (source, hub) = setup();
        let mut slot = SessionSlot::new();

        let first = match slot.open(tuple("main", ""), &hub) {
            OpenOutcome::Opened { id, .. } => id,
            OpenOutcome::Reused(_) => panic!("expected a new session"),
        };
        let outcome = slot.open(tuple("main", "err"), &hub);
        let OpenOutcome::Opened { replaced, .. } = outcome else {
            panic!("expected a new session");
        };
        assert_eq!(replaced, Some(first));
        assert_eq!(source.open_count(), 2);

        // The old tuple has no subscribers left
        assert_eq!(
            hub.get(&tuple("main", ""))
                .map_or(0, |caster| caster.subscriber_count()),
            0
        );
        assert_eq!(source.opened_tuples()[1].filter_term(), "err");
    }

    #[tokio::test]
    async fn test_lines_then_failure_is_terminal() {
        let (source, hub) = setup();
        let mut slot = SessionSlot::new();
        slot.open(tuple("main", ""), &hub);
        let feed = source.latest_feed().unwrap();

        feed.push("hello");
        feed.fail(SourceError::Connect("refused".to_string()));

        let (_, event) = slot.next_event().await.unwrap();
        assert_eq!(event, SessionEvent::Line(LogLine::new("hello")));
        let (_, event) = slot.next_event().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::Failed(SourceError::Connect("refused".to_string()))
        );

        assert!(!slot.is_delivering());
        assert_eq!(slot.current().unwrap().status(), SessionStatus::Failed);
        assert!(slot.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_session_is_reopened_for_same_tuple() {
        let (source, hub) = setup();
        let mut slot = SessionSlot::new();
        slot.open(tuple("main", ""), &hub);
        source
            .latest_feed()
            .unwrap()
            .fail(SourceError::Stream("reset".to_string()));
        slot.next_event().await;

        let outcome = slot.open(tuple("main", ""), &hub);
        assert!(matches!(outcome, OpenOutcome::Opened { .. }));
        assert_eq!(source.open_count(), 2);
        assert!(slot.is_delivering());
    }

    #[tokio::test]
    async fn test_end_of_stream_is_caught_up_and_reusable() {
        let (source, hub) = setup();
        let mut slot = SessionSlot::new();
        slot.open(tuple("init", ""), &hub);
        source.latest_feed().unwrap().finish();

        let (_, event) = slot.next_event().await.unwrap();
        assert_eq!(event, SessionEvent::CaughtUp);
        assert_eq!(slot.current().unwrap().status(), SessionStatus::Ended);
        assert!(matches!(
            slot.open(tuple("init", ""), &hub),
            OpenOutcome::Reused(_)
        ));
    }

    #[tokio::test]
    async fn test_cancel_stops_delivery_immediately() {
        let (source, hub) = setup();
        let mut slot = SessionSlot::new();
        slot.open(tuple("main", ""), &hub);
        let feed = source.latest_feed().unwrap();
        feed.push("before cancel");

        assert!(slot.cancel().is_some());
        assert!(slot.next_event().await.is_none());
        assert!(slot.current().is_none());
    }
}
