//! Inspect command - prints a package manifest.

use anyhow::{Context, Result};
use std::path::Path;

use dualroot_upgrade::archive::TarArchive;
use dualroot_upgrade::config::Config;
use dualroot_upgrade::package::{self, Package, Payload};

/// Execute the inspect command.
pub fn cmd_inspect(package: &Path, json: bool, config: &Config) -> Result<()> {
    let extractor = TarArchive::new(config.compression);
    let pkg = package::read(&extractor, package, &config.staging_dir)
        .with_context(|| format!("Failed to read package {}", package.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&pkg)?);
    } else {
        print_package(&pkg, config.device_id);
    }
    Ok(())
}

fn print_package(pkg: &Package, device_id: Option<u32>) {
    println!("Package: {}", pkg.origin().display());
    println!("  Type: {}", pkg.package_type());
    match pkg.version() {
        Some(v) => println!("  Version: {}", v),
        None => println!("  Version: (none)"),
    }
    if let Payload::Os(os) = pkg.payload() {
        let ids: Vec<String> = os.apply_ids.iter().map(|id| id.to_string()).collect();
        println!("  Apply ids: {}", ids.join(", "));
    }
    for warning in pkg.warnings() {
        println!("  Warning: {}", warning);
    }

    println!();
    println!("Blobs:");
    for entry in pkg.entries() {
        let blob = entry.blob;
        print!("  {:<10} {:<32} {}", blob.kind, blob.name, blob.checksum.to_hex());
        if let Some(v) = &blob.version {
            print!("  v{}", v);
        }
        if let Some(ids) = entry.apply_ids {
            let list: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            print!("  [{}]", list.join(", "));
            if device_id.is_some_and(|id| !ids.contains(id)) {
                print!("  (not for this device)");
            }
        }
        println!();
    }
}
