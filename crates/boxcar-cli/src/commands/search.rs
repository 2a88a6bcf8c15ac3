//! Search command implementation.

use anyhow::{bail, Result};
use boxcar_image::directory::DirectoryClient;
use boxcar_image::{HttpClients, ImageReference};
use clap::Args;

use crate::commands::{load_config, Cli};

/// Arguments for the search command.
#[derive(Args, Clone)]
pub struct SearchArgs {
    /// Image to search for (e.g. alpine:3.19)
    pub image: String,

    /// Restrict results to an architecture
    #[arg(long)]
    pub arch: Option<String>,
}

/// Executes the search command.
pub async fn execute(cli: &Cli, args: SearchArgs) -> Result<()> {
    let config = load_config(cli)?;
    if !config.settings.enable_advanced_api {
        bail!("directory search requires enable_advanced_api in the configuration");
    }

    let reference = ImageReference::parse(&args.image)?;
    let clients = HttpClients::new()?;
    let directory = DirectoryClient::new(
        config.settings.advanced_api_url.clone(),
        clients.verifying().clone(),
    );

    let platform = args.arch.as_deref().map(|arch| format!("linux/{arch}"));
    let results = directory
        .search_with_fallback(&reference.repository, &reference.tag, platform.as_deref())
        .await?;

    if results.is_empty() {
        println!("No mirrors found for {}", reference.repo_tag());
        return Ok(());
    }

    println!("{:<60} {:<14} {:>10}  SOURCE", "MIRROR", "PLATFORM", "SIZE");
    for record in &results {
        println!(
            "{:<60} {:<14} {:>10}  {}",
            record.mirror, record.platform, record.size, record.source
        );
    }

    Ok(())
}
