// ABOUTME: CLI tail command - print a step's decorated log lines to stdout
//
// Runs the same viewer controller as the TUI, without a terminal UI. Ends when
// the stream ends or on Ctrl-C; a source failure is an error exit.

use anyhow::{Context, Result};
use pipelog::config::AppConfig;
use pipelog::source::PipelineLogClient;
use pipelog::stream::MulticastHub;
use pipelog::viewer::{ViewerError, ViewerUpdate};
use std::sync::Arc;
use tracing::info;

use super::StreamArgs;

/// Execute the tail command
pub async fn execute(args: StreamArgs, config: AppConfig) -> Result<()> {
    let client = PipelineLogClient::new(&config.server)?;
    let replay_limit = config.viewer.replay_limit();
    let hub = MulticastHub::new(Arc::new(client), Some(replay_limit));
    let mut controller = args.controller(config.viewer, hub)?;

    if let Some(ViewerUpdate::Errored(e)) = controller.start() {
        eprintln!("warning: {e}");
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted, stopping tail");
                controller.dispose();
                return Ok(());
            }
            update = controller.next_update() => match update {
                Some(ViewerUpdate::Line(line)) => println!("{}", line.text),
                Some(ViewerUpdate::Errored(ViewerError::Source(e))) => {
                    return Err(e).with_context(|| format!("Log stream for {} failed", controller.target()));
                }
                Some(ViewerUpdate::Errored(e)) => eprintln!("warning: {e}"),
                Some(ViewerUpdate::CaughtUp | ViewerUpdate::FilterCommitted { .. }) => {}
                None => return Ok(()),
            }
        }
    }
}
