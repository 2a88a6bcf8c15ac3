//! Config command implementation.

use anyhow::Result;
use clap::Subcommand;

use crate::commands::{load_config, Cli};

/// Config subcommands.
#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Print the effective merged configuration as TOML
    Show,

    /// Write the default configuration file
    Init,
}

/// Executes a config subcommand.
pub fn execute(cli: &Cli, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let config = load_config(cli)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        ConfigCommands::Init => {
            let path = match &cli.config {
                Some(path) => path.clone(),
                None => boxcar_image::config::user_config_path(),
            };
            let written = boxcar_image::Config::init_file(path)?;
            println!("Wrote default configuration to {}", written.display());
            Ok(())
        }
    }
}
