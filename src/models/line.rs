// ABOUTME: Log line as received from the source and its decorated display form

use serde::{Deserialize, Serialize};

/// One record produced by the log source. Never mutated after receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    pub message: String,
}

impl LogLine {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Message text with matched filter spans wrapped in highlight markers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine {
    pub text: String,
}

impl DisplayLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Undecorated display form of a line
    pub fn plain(line: &LogLine) -> Self {
        Self::new(line.message.clone())
    }
}
