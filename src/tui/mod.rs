// ABOUTME: Terminal UI for the log viewer
//
// Owns the terminal lifecycle (raw mode, alternate screen) and the event loop:
// draw, handle pending key presses, otherwise wait briefly for the controller's
// next update so the screen stays responsive to input.

pub mod events;
pub mod render;

use crate::viewer::ViewerController;
use anyhow::{bail, Result};
use crossterm::{
    event::{self, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::Backend, prelude::*, Terminal};
use std::io::{self, IsTerminal};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info};

pub use events::{EventHandler, Flow, ViewState, ViewerEvent};

/// How long to wait for stream activity before checking input again
const TICK_RATE: Duration = Duration::from_millis(100);
/// Updates applied between two redraws
const MAX_BATCH: usize = 256;

/// Terminal cleanup utility to ensure proper restoration
pub fn cleanup_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

fn cleanup_terminal_with_instance<B: Backend + io::Write>(terminal: &mut Terminal<B>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Run the viewer until the user quits
pub async fn run(mut controller: ViewerController) -> Result<()> {
    if !IsTerminal::is_terminal(&io::stdout()) {
        bail!(
            "No TTY detected. The viewer requires a terminal.\n\
             Use `pipelog tail` to stream logs to a pipe or file."
        );
    }

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_loop(&mut controller, &mut terminal).await;

    if let Err(e) = cleanup_terminal_with_instance(&mut terminal) {
        error!("Failed to cleanup terminal: {}", e);
        cleanup_terminal();
    }
    controller.dispose();

    result
}

async fn run_loop<B: Backend>(
    controller: &mut ViewerController,
    terminal: &mut Terminal<B>,
) -> Result<()> {
    let mut view = ViewState::default();
    controller.start();
    info!(step = %controller.target(), "Viewer started");

    loop {
        terminal.draw(|frame| render::render(frame, controller, &view))?;

        if event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                if let Some(viewer_event) = EventHandler::handle_key_event(key) {
                    if view.apply(viewer_event, controller) == Flow::Quit {
                        debug!("Quit requested");
                        return Ok(());
                    }
                }
            }
            continue;
        }

        match timeout(TICK_RATE, controller.next_update()).await {
            Ok(Some(update)) => {
                view.on_update(&update);
                // Apply whatever else is ready before the next redraw
                for _ in 0..MAX_BATCH {
                    match timeout(Duration::ZERO, controller.next_update()).await {
                        Ok(Some(update)) => view.on_update(&update),
                        _ => break,
                    }
                }
            }
            // Nothing to wait for: block on input instead
            Ok(None) => {
                event::poll(TICK_RATE)?;
            }
            Err(_) => {}
        }
    }
}
