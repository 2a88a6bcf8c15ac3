//! Registries command implementation.

use anyhow::Result;

use crate::commands::{load_config, Cli};

/// Lists configured registries in priority order.
pub fn execute(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    println!(
        "{:<14} {:<44} {:>8} {:>9}  DESCRIPTION",
        "NAME", "HOST", "PRIORITY", "TIMEOUT"
    );
    for registry in config.sorted_registries() {
        println!(
            "{:<14} {:<44} {:>8} {:>8}s  {}",
            registry.name,
            registry.host,
            registry.priority,
            registry.timeout_secs,
            registry.description
        );
    }

    Ok(())
}
