//! Apply command - runs one upgrade attempt.

use anyhow::{bail, Context, Result};
use std::path::Path;

use dualroot_upgrade::archive::TarArchive;
use dualroot_upgrade::config::Config;
use dualroot_upgrade::error::UpgradeFailure;
use dualroot_upgrade::lock::UpgradeLock;
use dualroot_upgrade::partition::PartitionLocator;
use dualroot_upgrade::upgrade::{UpgradeReport, Upgrader};

/// Execute the apply command.
pub fn cmd_apply(package: &Path, config: &Config) -> Result<()> {
    let device_id = config.require_device_id()?;
    if !package.is_file() {
        bail!("Package not found: {}", package.display());
    }

    let _lock = UpgradeLock::acquire(&config.lock_file)?;

    let extractor = TarArchive::new(config.compression);
    let locator = PartitionLocator::new(&config.cmdline, config.root_pairs.clone());
    let upgrader = Upgrader::new(
        device_id,
        &config.staging_dir,
        &extractor,
        &locator,
        &config.hooks,
    );

    match upgrader.run(package) {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(failure) => {
            print_failure(&failure);
            Err(failure).with_context(|| format!("Upgrade with {} failed", package.display()))
        }
    }
}

fn print_report(report: &UpgradeReport) {
    println!("Upgrade complete ({} package)", report.package_type);
    println!("  Target: {}", report.target);
    for name in &report.installed {
        println!("  installed: {}", name);
    }
    for skipped in &report.skipped {
        println!("  skipped:   {} ({})", skipped.name, skipped.reason);
    }
    println!();
    println!(
        "Switch the bootloader to {} to boot the new system.",
        report.target.device.display()
    );
}

fn print_failure(failure: &UpgradeFailure) {
    if let UpgradeFailure::PartialFailure {
        failed,
        not_attempted,
    } = failure
    {
        println!("Upgrade incomplete:");
        for f in failed {
            println!(
                "  failed:        {} ({} at {}): {}",
                f.name, f.kind, f.stage, f.reason
            );
        }
        for name in not_attempted {
            println!("  not attempted: {}", name);
        }
        println!();
        println!("The running system is untouched; do not boot the backup root.");
    }
}
