//! Clean command - removes staging directories left by interrupted upgrades.

use anyhow::{Context, Result};

use dualroot_upgrade::config::Config;
use dualroot_upgrade::lock::UpgradeLock;
use dualroot_upgrade::staging;

/// Execute the clean command.
pub fn cmd_clean(config: &Config) -> Result<()> {
    // A running upgrade owns its staging directory.
    let _lock = UpgradeLock::acquire(&config.lock_file)?;

    let dir = &config.staging_dir;
    if !dir.exists() {
        println!("Nothing to clean: {} does not exist.", dir.display());
        return Ok(());
    }

    println!("Cleaning stale staging directories in {}...", dir.display());
    let removed = staging::clean_stale(dir)
        .with_context(|| format!("Failed to clean {}", dir.display()))?;
    for path in &removed {
        println!("  removed {}", path.display());
    }
    println!("Removed {} stale staging director(ies).", removed.len());
    Ok(())
}
