// ABOUTME: Viewer state machine values, updates and errors
//
// Idle -> Connecting -> Streaming, with Errored reachable from Connecting and
// Streaming. Every state past Idle carries the tuple it describes, so a state
// can never refer to a session other than the current one.

use crate::models::{DisplayLine, ParameterTuple};
use crate::source::SourceError;
use crate::stream::FilterError;
use thiserror::Error;

/// Errors surfaced to the viewing layer, distinguishable by kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    FilterCompile(#[from] FilterError),

    #[error("Unknown container '{name}' (available: {})", available.join(", "))]
    UnknownContainer {
        name: String,
        available: Vec<String>,
    },
}

impl ViewerError {
    /// Source failures tear down the session; everything else leaves it running
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing selected yet, or disposed
    #[default]
    Idle,
    /// Session opened, nothing received yet
    Connecting { tuple: ParameterTuple },
    /// At least one line or the caught-up signal received
    Streaming {
        tuple: ParameterTuple,
        caught_up: bool,
    },
    /// Source failure or invalid filter pattern for `tuple`
    Errored {
        tuple: ParameterTuple,
        error: ViewerError,
    },
}

impl SessionState {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting { .. } => "connecting",
            Self::Streaming { .. } => "streaming",
            Self::Errored { .. } => "errored",
        }
    }

    pub const fn tuple(&self) -> Option<&ParameterTuple> {
        match self {
            Self::Idle => None,
            Self::Connecting { tuple }
            | Self::Streaming { tuple, .. }
            | Self::Errored { tuple, .. } => Some(tuple),
        }
    }

    pub const fn error(&self) -> Option<&ViewerError> {
        match self {
            Self::Errored { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Whether the viewer has data to show for the current tuple
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Streaming { .. })
    }
}

/// One reaction of the controller, returned by `next_update`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerUpdate {
    /// The debounced filter became effective
    FilterCommitted { term: String },
    /// A decorated line was appended to the scrollback
    Line(DisplayLine),
    /// The source has delivered everything it had
    CaughtUp,
    Errored(ViewerError),
}
