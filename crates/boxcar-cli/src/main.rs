//! boxcar - pull container images from the best available mirror registry
//! into a docker-loadable tar.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on debug flag
    let filter = if cli.debug {
        "boxcar=debug,boxcar_image=debug"
    } else {
        "boxcar=info,boxcar_image=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command.clone() {
        Commands::Pull(args) => commands::pull::execute(&cli, args).await,
        Commands::Search(args) => commands::search::execute(&cli, args).await,
        Commands::Registries => commands::registries::execute(&cli),
        Commands::Config(cmd) => commands::config::execute(&cli, cmd),
    }
}
