// ABOUTME: ViewerController drives one step's log view from user parameters to display lines
//
// Container selection applies immediately; filter edits go through the debounce
// filter and only the committed term reaches the tuple. Every tuple change goes
// through the session slot, which cancels the previous session before opening
// the next, so only the current tuple's lines are ever decorated and kept.

use super::state::{SessionState, ViewerError, ViewerUpdate};
use crate::config::ViewerConfig;
use crate::models::{DisplayLine, LogLine, ParameterTuple, StepTarget};
use crate::stream::{
    DebounceFilter, FilterError, Highlighter, MulticastHub, OpenOutcome, SessionEvent,
    SessionId, SessionSlot, StreamSession,
};
use std::collections::VecDeque;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

pub struct ViewerController {
    target: StepTarget,
    config: ViewerConfig,
    hub: MulticastHub,
    container: String,
    raw_filter: String,
    filter_term: String,
    highlighter: Result<Highlighter, FilterError>,
    debounce: DebounceFilter,
    slot: SessionSlot,
    state: SessionState,
    lines: VecDeque<DisplayLine>,
}

impl std::fmt::Debug for ViewerController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewerController")
            .field("target", &self.target)
            .field("container", &self.container)
            .field("filter_term", &self.filter_term)
            .field("state", &self.state.name())
            .field("lines", &self.lines.len())
            .finish()
    }
}

impl ViewerController {
    pub fn new(target: StepTarget, config: ViewerConfig, hub: MulticastHub) -> Self {
        let highlighter = Highlighter::with_size_limit("", config.max_pattern_size);
        Self {
            container: config.default_container.clone(),
            debounce: DebounceFilter::new(config.debounce),
            target,
            config,
            hub,
            raw_filter: String::new(),
            filter_term: String::new(),
            highlighter,
            slot: SessionSlot::new(),
            state: SessionState::Idle,
            lines: VecDeque::new(),
        }
    }

    /// Start with `text` already committed, bypassing the debounce
    #[must_use]
    pub fn with_filter(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.raw_filter.clone_from(&text);
        self.highlighter = Highlighter::with_size_limit(&text, self.config.max_pattern_size);
        self.filter_term = text;
        self
    }

    /// Open the initial tuple. No-op once a tuple is active.
    pub fn start(&mut self) -> Option<ViewerUpdate> {
        if !matches!(self.state, SessionState::Idle) {
            return None;
        }
        info!(step = %self.target, container = %self.container, "Starting log viewer");
        self.open_current()
    }

    /// Switch container. Returns the filter error if the tuple opened in an errored state.
    pub fn select_container(&mut self, name: &str) -> Result<(), ViewerError> {
        if !self.config.containers.iter().any(|c| c == name) {
            return Err(ViewerError::UnknownContainer {
                name: name.to_string(),
                available: self.config.containers.clone(),
            });
        }

        if self.container != name {
            info!(from = %self.container, to = %name, "Container selected");
            self.container = name.to_string();
        }
        match self.open_current() {
            Some(ViewerUpdate::Errored(error)) => Err(error),
            _ => Ok(()),
        }
    }

    /// Record a filter edit; the tuple changes only after the quiet period
    pub fn set_raw_filter(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.raw_filter.clone_from(&text);
        self.debounce.on_input(text, Instant::now());
    }

    /// Reopen the current tuple with a fresh session
    pub fn retry(&mut self) -> Option<ViewerUpdate> {
        if matches!(self.state, SessionState::Idle) {
            return None;
        }
        info!(step = %self.target, state = self.state.name(), "Retrying log stream");
        self.slot.cancel();
        self.open_current()
    }

    /// Cancel the pending commit and the active session
    pub fn dispose(&mut self) {
        self.debounce.dispose();
        if let Some(id) = self.slot.cancel() {
            info!(session = %id, step = %self.target, "Log viewer disposed");
        }
        self.transition(SessionState::Idle);
    }

    /// Wait for the next reaction: a debounce commit or a session event.
    ///
    /// Returns `None` when there is nothing left to wait for. Cancel-safe.
    pub async fn next_update(&mut self) -> Option<ViewerUpdate> {
        loop {
            let deadline = self.debounce.deadline();
            let delivering = self.slot.is_delivering();
            if deadline.is_none() && !delivering {
                return None;
            }

            tokio::select! {
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(term) = self.debounce.poll_commit(Instant::now()) {
                        return Some(self.commit_filter(term));
                    }
                }
                event = self.slot.next_event(), if delivering => {
                    if let Some((id, event)) = event {
                        if let Some(update) = self.handle_event(id, event) {
                            return Some(update);
                        }
                    }
                }
            }
        }
    }

    /// Display lines of the current tuple, oldest first
    pub const fn lines(&self) -> &VecDeque<DisplayLine> {
        &self.lines
    }

    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// Filter text as typed, possibly not yet committed
    pub fn raw_filter(&self) -> &str {
        &self.raw_filter
    }

    /// Committed filter term used for the source and for highlighting
    pub fn filter_term(&self) -> &str {
        &self.filter_term
    }

    pub fn containers(&self) -> &[String] {
        &self.config.containers
    }

    pub const fn target(&self) -> &StepTarget {
        &self.target
    }

    /// Whether a typed filter is waiting for its quiet period
    pub const fn is_filter_pending(&self) -> bool {
        self.debounce.is_pending()
    }

    /// The current session id, if a session is open
    pub fn session_id(&self) -> Option<SessionId> {
        self.slot.current().map(StreamSession::id)
    }

    fn current_tuple(&self) -> ParameterTuple {
        ParameterTuple::new(
            &self.target,
            self.container.as_str(),
            self.filter_term.as_str(),
            self.config.tail_lines,
        )
    }

    fn commit_filter(&mut self, term: String) -> ViewerUpdate {
        info!(term = %term, "Filter term committed");
        self.highlighter = Highlighter::with_size_limit(&term, self.config.max_pattern_size);
        self.filter_term = term;

        if !matches!(self.state, SessionState::Idle) {
            if let Some(update @ ViewerUpdate::Errored(_)) = self.open_current() {
                return update;
            }
        }
        ViewerUpdate::FilterCommitted {
            term: self.filter_term.clone(),
        }
    }

    /// Serve the current tuple, replacing the session when the tuple changed
    fn open_current(&mut self) -> Option<ViewerUpdate> {
        let tuple = self.current_tuple();
        match self.slot.open(tuple.clone(), &self.hub) {
            OpenOutcome::Reused(id) => {
                debug!(session = %id, "Tuple unchanged, keeping session");
                None
            }
            OpenOutcome::Opened { id, replaced } => {
                debug!(session = %id, replaced = ?replaced, tuple = %tuple, "Session replaced");
                self.lines.clear();
                match &self.highlighter {
                    Ok(_) => {
                        self.transition(SessionState::Connecting { tuple });
                        None
                    }
                    Err(e) => {
                        let error = ViewerError::FilterCompile(e.clone());
                        warn!(error = %error, "Filter does not compile, lines shown undecorated");
                        self.transition(SessionState::Errored {
                            tuple,
                            error: error.clone(),
                        });
                        Some(ViewerUpdate::Errored(error))
                    }
                }
            }
        }
    }

    fn handle_event(&mut self, id: SessionId, event: SessionEvent) -> Option<ViewerUpdate> {
        if self.session_id() != Some(id) {
            debug!(session = %id, "Dropping event from superseded session");
            return None;
        }
        let tuple = self.state.tuple()?.clone();

        match event {
            SessionEvent::Line(line) => {
                let display = self.decorate(&line);
                self.push_line(display.clone());
                if matches!(self.state, SessionState::Connecting { .. }) {
                    self.transition(SessionState::Streaming {
                        tuple,
                        caught_up: false,
                    });
                }
                Some(ViewerUpdate::Line(display))
            }
            SessionEvent::CaughtUp => {
                if matches!(
                    self.state,
                    SessionState::Connecting { .. } | SessionState::Streaming { .. }
                ) {
                    self.transition(SessionState::Streaming {
                        tuple,
                        caught_up: true,
                    });
                }
                Some(ViewerUpdate::CaughtUp)
            }
            SessionEvent::Failed(e) => {
                let error = ViewerError::Source(e);
                self.transition(SessionState::Errored {
                    tuple,
                    error: error.clone(),
                });
                Some(ViewerUpdate::Errored(error))
            }
        }
    }

    fn decorate(&self, line: &LogLine) -> DisplayLine {
        match &self.highlighter {
            Ok(highlighter) => highlighter.decorate(line),
            Err(_) => DisplayLine::plain(line),
        }
    }

    fn push_line(&mut self, line: DisplayLine) {
        self.lines.push_back(line);
        while self.lines.len() > self.config.scrollback {
            self.lines.pop_front();
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!(from = self.state.name(), to = next.name(), "Viewer state change");
        }
        self.state = next;
    }
}

impl Drop for ViewerController {
    fn drop(&mut self) {
        self.debounce.dispose();
        self.slot.cancel();
    }
}
