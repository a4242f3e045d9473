// ABOUTME: Main entry point for pipelog with TUI and CLI support
//
// Binary: pipelog
// Usage: pipelog [--config PATH] [--server URL] [--token T] <COMMAND>
// - view: interactive log viewer for one pipeline step
// - tail: print a step's log lines to stdout

#![allow(missing_docs)]

use anyhow::Result;
use clap::Parser;
use pipelog::source::PipelineLogClient;
use pipelog::stream::MulticastHub;
use std::sync::Arc;

mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    setup_panic_handler();

    let args = cli::Cli::parse();
    let config = args.load_config()?;
    tracing::info!(server = %config.server.base_url, "Configuration loaded");

    match args.command {
        cli::Commands::View(stream_args) => {
            let client = PipelineLogClient::new(&config.server)?;
            let replay_limit = config.viewer.replay_limit();
            let hub = MulticastHub::new(Arc::new(client), Some(replay_limit));
            let controller = stream_args.controller(config.viewer, hub)?;
            pipelog::tui::run(controller).await
        }
        cli::Commands::Tail(stream_args) => cli::tail::execute(stream_args, config).await,
    }
}

fn setup_logging() {
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use tracing_subscriber::prelude::*;

    let log_dir = dirs::home_dir()
        .map(|home| home.join(".pipelog").join("logs"))
        .unwrap_or_else(|| PathBuf::from(".pipelog/logs"));

    let _ = std::fs::create_dir_all(&log_dir);

    // JSONL log file with timestamp
    let log_file = log_dir.join(format!(
        "pipelog-{}.jsonl",
        chrono::Local::now().format("%Y%m%d-%H%M%S")
    ));

    // Logging must never reach the terminal the viewer draws on
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&log_file) else {
        return;
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_writer(file)
                .with_ansi(false),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipelog=info".into()),
        )
        .init();
}

fn setup_panic_handler() {
    use tracing::error;

    std::panic::set_hook(Box::new(|panic_info| {
        // Ensure terminal is restored before logging the panic
        pipelog::tui::cleanup_terminal();

        error!("Application panicked: {}", panic_info);
        eprintln!("Application panicked: {}", panic_info);
        eprintln!("Please check the logs in ~/.pipelog/logs for more details.");
    }));
}
