//! Preflight command - runs preflight checks.

use anyhow::Result;

use dualroot_upgrade::config::Config;
use dualroot_upgrade::preflight;

/// Execute the preflight command.
pub fn cmd_preflight(config: &Config, strict: bool) -> Result<()> {
    if strict {
        preflight::require_ready(config)?;
    } else {
        let report = preflight::run_preflight(config);
        report.print()?;
        if !report.is_ready() {
            println!("Use --strict to exit with an error when blocked.");
        }
    }
    Ok(())
}
