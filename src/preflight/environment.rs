//! Device environment checks (identity, partitions, staging, hooks).

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::config::Config;
use crate::package::BlobKind;
use crate::partition::PartitionLocator;
use crate::staging::StagingDir;

use super::{Area, Check};

/// Check the device is set up to accept upgrades.
pub fn check_environment(config: &Config, locator: &PartitionLocator) -> Vec<Check> {
    let mut results = Vec::new();

    match config.device_id {
        Some(id) => results.push(Check::ready(Area::Device, "device id", id.to_string())),
        None => results.push(Check::blocked(
            Area::Device,
            "device id",
            "UPGRADE_DEVICE_ID is not set",
        )),
    }

    results.extend(check_partitions(locator));
    results.push(check_staging_writable(&config.staging_dir));

    for kind in [BlobKind::Bootloader, BlobKind::Kernel, BlobKind::Rootfs] {
        results.push(check_hook(kind, config.hooks.hook(kind)));
    }

    results
}

fn check_partitions(locator: &PartitionLocator) -> Vec<Check> {
    let active = match locator.active_root() {
        Ok(active) => active,
        Err(e) => {
            return vec![Check::blocked(Area::Device, "active root", e.to_string())];
        }
    };

    let mut results = vec![Check::ready(Area::Device, "active root", active.to_string())];
    results.push(match locator.backup_root(&active) {
        Ok(backup) => Check::ready(Area::Device, "backup root", backup.to_string()),
        Err(e) => Check::blocked(Area::Device, "backup root", e.to_string()),
    });
    results
}

fn check_staging_writable(dir: &Path) -> Check {
    let name = "staging directory writable";
    if let Err(e) = fs::create_dir_all(dir) {
        return Check::blocked(Area::Device, name, format!("cannot create {}: {}", dir.display(), e));
    }

    // A real staging directory, so the check exercises the same permissions.
    match StagingDir::create(dir) {
        Ok(staging) => {
            let detail = dir.display().to_string();
            match staging.close() {
                Ok(()) => Check::ready(Area::Device, name, detail),
                Err(e) => Check::degraded(
                    Area::Device,
                    name,
                    format!("{}: cannot remove staging directories: {}", detail, e),
                ),
            }
        }
        Err(e) => Check::blocked(Area::Device, name, format!("cannot write to {}: {}", dir.display(), e)),
    }
}

/// A missing hook only matters for packages carrying that blob kind, so warn.
fn check_hook(kind: BlobKind, hook: Option<&Path>) -> Check {
    let name = format!("{} hook", kind);
    let Some(hook) = hook else {
        return Check::degraded(
            Area::Hooks,
            name,
            format!("not set, {} blobs cannot be installed", kind),
        );
    };

    match fs::metadata(hook) {
        Ok(meta) if meta.is_file() && meta.permissions().mode() & 0o111 != 0 => {
            Check::ready(Area::Hooks, name, hook.display().to_string())
        }
        Ok(_) => Check::blocked(Area::Hooks, name, format!("{} is not executable", hook.display())),
        Err(e) => Check::blocked(Area::Hooks, name, format!("{}: {}", hook.display(), e)),
    }
}
