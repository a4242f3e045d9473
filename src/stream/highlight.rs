// ABOUTME: Wraps filter matches in ANSI highlight markers for display
//
// The effective filter term is compiled as a case-sensitive regular expression.
// An empty term leaves lines untouched, and empty matches are never wrapped.

use crate::models::{DisplayLine, LogLine};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

/// Bold, bright yellow background, white text
pub const HIGHLIGHT_START: &str = "\u{1b}[1m\u{1b}[43;1m\u{1b}[37m";
/// Reset
pub const HIGHLIGHT_END: &str = "\u{1b}[0m";

const DEFAULT_SIZE_LIMIT: usize = 1 << 20;

/// The filter term is not a valid pattern
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid filter pattern {term:?}: {message}")]
pub struct FilterError {
    pub term: String,
    pub message: String,
}

/// Decorate one line with a freshly compiled term
pub fn decorate(line: &LogLine, term: &str) -> Result<DisplayLine, FilterError> {
    Ok(Highlighter::new(term)?.decorate(line))
}

/// Compiled filter term, reused for every line of a session
#[derive(Debug, Clone)]
pub struct Highlighter {
    term: String,
    pattern: Option<Regex>,
}

impl Highlighter {
    pub fn new(term: &str) -> Result<Self, FilterError> {
        Self::with_size_limit(term, DEFAULT_SIZE_LIMIT)
    }

    /// Compile with a cap on the compiled program size
    pub fn with_size_limit(term: &str, size_limit: usize) -> Result<Self, FilterError> {
        let pattern = if term.is_empty() {
            None
        } else {
            let regex = RegexBuilder::new(term)
                .size_limit(size_limit)
                .build()
                .map_err(|e| FilterError {
                    term: term.to_string(),
                    message: e.to_string(),
                })?;
            Some(regex)
        };

        Ok(Self {
            term: term.to_string(),
            pattern,
        })
    }

    pub fn term(&self) -> &str {
        &self.term
    }

    pub fn decorate(&self, line: &LogLine) -> DisplayLine {
        let Some(pattern) = &self.pattern else {
            return DisplayLine::plain(line);
        };

        let message = line.message.as_str();
        let mut text = String::with_capacity(message.len() + 16);
        let mut last = 0;
        for found in pattern.find_iter(message) {
            if found.start() == found.end() {
                continue;
            }
            text.push_str(&message[last..found.start()]);
            text.push_str(HIGHLIGHT_START);
            text.push_str(found.as_str());
            text.push_str(HIGHLIGHT_END);
            last = found.end();
        }
        text.push_str(&message[last..]);

        DisplayLine::new(text)
    }
}
