// ABOUTME: Key handling for the log viewer screen
//
// Keys map to ViewerEvents; ViewState applies them to the controller and keeps
// the scroll position. Printable characters always edit the filter, so
// container shortcuts live on Tab/arrows and Alt+digit.

use crate::viewer::{ViewerController, ViewerUpdate};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::{debug, warn};

/// Lines moved by PageUp / PageDown
const PAGE_LINES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerEvent {
    Quit,
    NextContainer,
    PreviousContainer,
    /// Zero-based index into the container list
    SelectContainer(usize),
    FilterInput(char),
    FilterBackspace,
    FilterClear,
    Retry,
    ScrollUp,
    ScrollDown,
    PageUp,
    PageDown,
    /// Jump back to the newest line and keep following
    Follow,
}

pub struct EventHandler;

impl EventHandler {
    pub fn handle_key_event(key: KeyEvent) -> Option<ViewerEvent> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Esc => Some(ViewerEvent::Quit),
            KeyCode::Char('c') if ctrl => Some(ViewerEvent::Quit),
            KeyCode::Char('r') if ctrl => Some(ViewerEvent::Retry),
            KeyCode::Char('u') if ctrl => Some(ViewerEvent::FilterClear),
            KeyCode::Char(digit @ '1'..='9') if alt => digit
                .to_digit(10)
                .map(|n| ViewerEvent::SelectContainer(n as usize - 1)),
            KeyCode::Char(c) if !ctrl && !alt => Some(ViewerEvent::FilterInput(c)),
            KeyCode::Backspace => Some(ViewerEvent::FilterBackspace),
            KeyCode::Tab | KeyCode::Right => Some(ViewerEvent::NextContainer),
            KeyCode::BackTab | KeyCode::Left => Some(ViewerEvent::PreviousContainer),
            KeyCode::Up => Some(ViewerEvent::ScrollUp),
            KeyCode::Down => Some(ViewerEvent::ScrollDown),
            KeyCode::PageUp => Some(ViewerEvent::PageUp),
            KeyCode::PageDown => Some(ViewerEvent::PageDown),
            KeyCode::End => Some(ViewerEvent::Follow),
            _ => None,
        }
    }
}

/// Whether the event loop keeps going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Screen-local state that is not part of the controller
#[derive(Debug, Default, Clone)]
pub struct ViewState {
    /// Lines scrolled back from the newest; 0 follows the tail
    pub scroll_back: usize,
    /// Last error that was not a state change (e.g. rejected container)
    pub notice: Option<String>,
}

impl ViewState {
    pub fn apply(&mut self, event: ViewerEvent, controller: &mut ViewerController) -> Flow {
        debug!(event = ?event, "Viewer key event");
        match event {
            ViewerEvent::Quit => {
                controller.dispose();
                return Flow::Quit;
            }
            ViewerEvent::NextContainer => self.step_container(controller, 1),
            ViewerEvent::PreviousContainer => {
                let len = controller.containers().len();
                self.step_container(controller, len.saturating_sub(1));
            }
            ViewerEvent::SelectContainer(index) => {
                if let Some(name) = controller.containers().get(index).cloned() {
                    self.select(controller, &name);
                }
            }
            ViewerEvent::FilterInput(c) => {
                let mut text = controller.raw_filter().to_string();
                text.push(c);
                controller.set_raw_filter(text);
            }
            ViewerEvent::FilterBackspace => {
                let mut text = controller.raw_filter().to_string();
                if text.pop().is_some() {
                    controller.set_raw_filter(text);
                }
            }
            ViewerEvent::FilterClear => {
                if !controller.raw_filter().is_empty() {
                    controller.set_raw_filter(String::new());
                }
            }
            ViewerEvent::Retry => {
                self.notice = None;
                self.scroll_back = 0;
                controller.retry();
            }
            ViewerEvent::ScrollUp => self.scroll_by(controller, 1),
            ViewerEvent::PageUp => self.scroll_by(controller, PAGE_LINES),
            ViewerEvent::ScrollDown => self.scroll_back = self.scroll_back.saturating_sub(1),
            ViewerEvent::PageDown => {
                self.scroll_back = self.scroll_back.saturating_sub(PAGE_LINES);
            }
            ViewerEvent::Follow => self.scroll_back = 0,
        }
        Flow::Continue
    }

    /// Keep the viewport steady while scrolled back
    pub fn on_update(&mut self, update: &ViewerUpdate) {
        match update {
            ViewerUpdate::Line(_) if self.scroll_back > 0 => self.scroll_back += 1,
            ViewerUpdate::FilterCommitted { .. } => self.scroll_back = 0,
            _ => {}
        }
    }

    fn step_container(&mut self, controller: &mut ViewerController, offset: usize) {
        let containers = controller.containers();
        let current = containers
            .iter()
            .position(|c| c == controller.container())
            .unwrap_or(0);
        if let Some(name) = containers.get((current + offset) % containers.len().max(1)).cloned() {
            self.select(controller, &name);
        }
    }

    fn select(&mut self, controller: &mut ViewerController, name: &str) {
        self.scroll_back = 0;
        self.notice = None;
        if let Err(e) = controller.select_container(name) {
            warn!(container = %name, error = %e, "Container selection reported an error");
            self.notice = Some(e.to_string());
        }
    }

    fn scroll_by(&mut self, controller: &ViewerController, lines: usize) {
        self.scroll_back = (self.scroll_back + lines).min(controller.lines().len());
    }
}
