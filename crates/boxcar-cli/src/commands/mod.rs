//! CLI command implementations.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod config;
pub mod pull;
pub mod registries;
pub mod search;

/// boxcar - multi-registry container image puller
#[derive(Parser)]
#[command(name = "boxcar")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (defaults to the user config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Pull an image and save it as a docker-loadable tar
    Pull(pull::PullArgs),

    /// Search the directory service for image mirrors
    Search(search::SearchArgs),

    /// List configured registries in priority order
    Registries,

    /// Manage configuration
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

/// Loads configuration honoring the global `--config` flag.
pub(crate) fn load_config(cli: &Cli) -> anyhow::Result<boxcar_image::Config> {
    let config = match &cli.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading configuration file");
            boxcar_image::Config::load_from(path)?
        }
        None => boxcar_image::Config::load()?,
    };
    Ok(config)
}
