//! Show command - displays information.

use anyhow::{Context, Result};

use dualroot_upgrade::config::Config;
use dualroot_upgrade::partition::PartitionLocator;

/// Show target for the show command.
pub enum ShowTarget {
    /// Show configuration
    Config,
    /// Show active and backup roots
    Partitions,
}

/// Execute the show command.
pub fn cmd_show(target: ShowTarget, config: &Config) -> Result<()> {
    match target {
        ShowTarget::Config => {
            config.print();
        }
        ShowTarget::Partitions => {
            let locator = PartitionLocator::new(&config.cmdline, config.root_pairs.clone());
            let active = locator.active_root().with_context(|| {
                format!("Cannot determine active root from {}", config.cmdline.display())
            })?;
            println!("Active root: {}", active);
            match locator.backup_root(&active) {
                Ok(backup) => println!("Backup root: {}", backup),
                Err(e) => println!("Backup root: NONE ({})", e),
            }
        }
    }
    Ok(())
}
