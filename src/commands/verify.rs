//! Verify command - checks every blob of a package against its checksum.

use anyhow::{bail, Context, Result};
use std::path::Path;

use dualroot_upgrade::archive::TarArchive;
use dualroot_upgrade::config::Config;
use dualroot_upgrade::package;
use dualroot_upgrade::verify;

/// Execute the verify command.
pub fn cmd_verify(package: &Path, config: &Config) -> Result<()> {
    let extractor = TarArchive::new(config.compression);
    let pkg = package::read(&extractor, package, &config.staging_dir)
        .with_context(|| format!("Failed to read package {}", package.display()))?;

    println!("Verifying {}...\n", package.display());
    let checks = verify::verify_package(&extractor, &pkg);
    let mut failed = 0;
    for check in &checks {
        match &check.result {
            Ok(()) => println!("  ✓ {}", check.name),
            Err(e) => {
                failed += 1;
                println!("  ✗ {}: {}", check.name, e);
            }
        }
    }
    println!();

    if failed > 0 {
        bail!("{} of {} blob(s) failed verification", failed, checks.len());
    }
    println!("All {} blob(s) verified.", checks.len());
    Ok(())
}
