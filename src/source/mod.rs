// ABOUTME: External log source contract consumed by the streaming core
//
// A source turns a parameter tuple into a lazy, cancellable sequence of log lines.
// Dropping the returned stream cancels the underlying request.
//
// Implementations:
// - sse: pipeline server streaming endpoint (server-sent events over HTTP)
// - manual: in-memory source fed by the caller (tests, demos)

pub mod manual;
pub mod sse;

use crate::models::{LogLine, ParameterTuple};
use futures_util::stream::BoxStream;
use thiserror::Error;

pub use manual::{ManualFeed, ManualLogSource};
pub use sse::PipelineLogClient;

/// Lines in arrival order; an `Err` item ends the stream
pub type LogStream = BoxStream<'static, Result<LogLine, SourceError>>;

/// Errors raised by a log source. Cloneable so one upstream failure can be
/// delivered to every subscriber of a shared stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The request could not be built from the tuple
    #[error("Invalid log request: {0}")]
    Request(String),

    /// The connection could not be established
    #[error("Failed to connect to log source: {0}")]
    Connect(String),

    /// The server answered with a non-success status
    #[error("Log source returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The stream broke or the server reported an error mid-stream
    #[error("Log stream failed: {0}")]
    Stream(String),
}

/// Opens log streams for a parameter tuple.
///
/// `filter_term` is applied by the source as a regular-expression match and
/// `tail_lines` is the initial backlog request. The stream must not perform any
/// I/O before it is first polled.
#[cfg_attr(test, mockall::automock)]
pub trait LogSource: Send + Sync {
    fn open_log_stream(&self, tuple: &ParameterTuple) -> LogStream;
}
