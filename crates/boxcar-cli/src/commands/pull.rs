//! Pull command implementation.

use anyhow::Result;
use boxcar_image::{Credentials, ImagePuller};
use clap::Args;

use crate::commands::{load_config, Cli};

/// Arguments for the pull command.
#[derive(Args, Clone)]
pub struct PullArgs {
    /// Image to pull (e.g. nginx:1.25, myorg/app:v2)
    pub image: String,

    /// Target CPU architecture (defaults to the configured one)
    #[arg(long)]
    pub arch: Option<String>,

    /// Registry username
    #[arg(short, long)]
    pub username: Option<String>,

    /// Registry password
    #[arg(short, long)]
    pub password: Option<String>,
}

/// Executes the pull command.
pub async fn execute(cli: &Cli, args: PullArgs) -> Result<()> {
    let config = load_config(cli)?;

    let credentials = match (args.username, args.password) {
        (Some(username), Some(password)) => Credentials::basic(username, password),
        _ => Credentials::anonymous(),
    };

    let puller = ImagePuller::new(config)?;
    let outcome = puller
        .pull(&args.image, args.arch.as_deref(), &credentials)
        .await?;

    println!("Saved image to {}", outcome.output.display());
    println!("Load it with: docker load -i {}", outcome.output.display());
    println!("Loaded tag will be: {}", outcome.repo_tag);

    Ok(())
}
