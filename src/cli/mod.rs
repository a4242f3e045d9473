// ABOUTME: CLI argument parsing and command routing for pipelog
//
// Provides command-line interface for:
// - Watching a step's logs interactively (view)
// - Streaming a step's logs to stdout (tail)

pub mod tail;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use pipelog::config::{AppConfig, ViewerConfig};
use pipelog::models::StepTarget;
use pipelog::stream::MulticastHub;
use pipelog::viewer::ViewerController;
use std::path::PathBuf;

/// Live log viewer for pipeline steps
#[derive(Parser)]
#[command(name = "pipelog")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: ./.pipelog/config.toml, then ~/.pipelog/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Pipeline server URL, overrides config and ARGO_SERVER
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Bearer token, overrides config and ARGO_TOKEN
    #[arg(long, global = true)]
    pub token: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Open the interactive log viewer
    View(StreamArgs),

    /// Print a step's log lines to stdout until the stream ends
    Tail(StreamArgs),
}

/// Arguments shared by view and tail
#[derive(clap::Args, Debug, Clone)]
pub struct StreamArgs {
    /// Namespace the pipeline runs in
    pub namespace: String,

    /// Pipeline name
    pub pipeline: String,

    /// Step name
    pub step: String,

    /// Container to read (default from config)
    #[arg(long, short)]
    pub container: Option<String>,

    /// Initial filter expression (regular expression)
    #[arg(long, short)]
    pub filter: Option<String>,

    /// Backlog lines requested when the stream opens
    #[arg(long, short)]
    pub tail: Option<u32>,
}

impl Cli {
    /// Resolve configuration: file, then environment, then command-line flags
    pub fn load_config(&self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let mut config = AppConfig::load_from(path)?;
                config.apply_env();
                config
            }
            None => AppConfig::load()?,
        };

        if let Some(server) = &self.server {
            config.server.base_url.clone_from(server);
        }
        if let Some(token) = &self.token {
            config.server.token = Some(token.clone());
        }
        config.viewer.validate()?;
        Ok(config)
    }
}

impl StreamArgs {
    pub fn target(&self) -> StepTarget {
        StepTarget::new(&self.namespace, &self.pipeline, &self.step)
    }

    /// Fold the per-invocation overrides into the viewer settings
    pub fn apply(&self, viewer: &mut ViewerConfig) -> Result<()> {
        if let Some(container) = &self.container {
            if !viewer.containers.contains(container) {
                bail!(
                    "Unknown container '{}' (available: {})",
                    container,
                    viewer.containers.join(", ")
                );
            }
            viewer.default_container.clone_from(container);
        }
        if let Some(tail) = self.tail {
            viewer.tail_lines = tail;
        }
        Ok(())
    }

    /// Build a viewer for this step, not yet started
    pub fn controller(&self, mut viewer: ViewerConfig, hub: MulticastHub) -> Result<ViewerController> {
        self.apply(&mut viewer)?;
        let controller = ViewerController::new(self.target(), viewer, hub);
        Ok(match &self.filter {
            Some(filter) => controller.with_filter(filter.as_str()),
            None => controller,
        })
    }
}
