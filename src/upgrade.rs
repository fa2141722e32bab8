//! Upgrade orchestration.
//!
//! One attempt runs through
//!
//! ```text
//! ReadingPackage -> Validating -> SelectingTarget -> ApplyingBlob(i)... -> Done
//!        \               \               \                 \
//!         +---------------+---------------+-----------------+--> Failed
//! ```
//!
//! Nothing is written to a partition before `ApplyingBlob`. Blobs are applied
//! bootloader first, then kernel, then rootfs, whatever order the manifest
//! lists them in. A bootloader or kernel failure aborts the attempt; a
//! failure of any other blob is recorded and the rest still run.
//!
//! Attempts must be serialized by the caller (see [`crate::lock`]).

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::archive::ArchiveExtractor;
use crate::error::{BlobFailure, BlobStage, InstallError, UpgradeFailure};
use crate::install::Installer;
use crate::package::{self, BlobEntry, BlobKind, Package, PackageType, Payload};
use crate::partition::{PartitionInfo, PartitionLocator};
use crate::staging::StagingDir;
use crate::verify;

/// States of an upgrade attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeState {
    ReadingPackage,
    Validating,
    SelectingTarget,
    /// Applying the blob at this position of the install order.
    ApplyingBlob(usize),
    Done,
    Failed,
}

impl fmt::Display for UpgradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpgradeState::ReadingPackage => f.write_str("reading package"),
            UpgradeState::Validating => f.write_str("validating"),
            UpgradeState::SelectingTarget => f.write_str("selecting target"),
            UpgradeState::ApplyingBlob(i) => write!(f, "applying blob #{}", i),
            UpgradeState::Done => f.write_str("done"),
            UpgradeState::Failed => f.write_str("failed"),
        }
    }
}

/// Why a blob was left alone without counting as a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// A multi-device blob whose apply ids exclude this device.
    NotForDevice,
    /// A blob kind with no install hook.
    NoHandler,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotForDevice => "not for this device",
            SkipReason::NoHandler => "no installer for this blob type",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedBlob {
    pub name: String,
    pub kind: BlobKind,
    pub reason: SkipReason,
}

/// Summary of a successful attempt.
#[derive(Debug, Clone)]
pub struct UpgradeReport {
    pub package_type: PackageType,
    pub target: PartitionInfo,
    /// Installed blob names, in install order.
    pub installed: Vec<String>,
    pub skipped: Vec<SkippedBlob>,
    /// Every state the attempt passed through, ending in `Done`.
    pub states: Vec<UpgradeState>,
}

/// Runs upgrade attempts against one device.
pub struct Upgrader<'a> {
    device_id: u32,
    staging_root: PathBuf,
    extractor: &'a dyn ArchiveExtractor,
    locator: &'a PartitionLocator,
    installer: &'a dyn Installer,
}

/// Bookkeeping for one attempt.
struct Attempt {
    states: Vec<UpgradeState>,
}

impl Attempt {
    fn enter(&mut self, state: UpgradeState) {
        info!("upgrade state: {}", state);
        self.states.push(state);
    }

    fn fail(&mut self, failure: UpgradeFailure) -> UpgradeFailure {
        error!("upgrade failed: {}", failure);
        self.enter(UpgradeState::Failed);
        failure
    }
}

/// Order blobs for installation: bootloader, kernel, rootfs, then the rest.
/// Blobs of the same kind keep their manifest order.
pub fn install_order(package: &Package) -> Vec<BlobEntry<'_>> {
    let mut entries = package.entries();
    entries.sort_by_key(|e| e.blob.kind.install_rank());
    entries
}

impl<'a> Upgrader<'a> {
    pub fn new(
        device_id: u32,
        staging_root: impl Into<PathBuf>,
        extractor: &'a dyn ArchiveExtractor,
        locator: &'a PartitionLocator,
        installer: &'a dyn Installer,
    ) -> Self {
        Self {
            device_id,
            staging_root: staging_root.into(),
            extractor,
            locator,
            installer,
        }
    }

    /// Run one complete attempt with the package at `archive`.
    ///
    /// The package and every staging directory are released before this
    /// returns, whatever the outcome.
    pub fn run(&self, archive: &Path) -> Result<UpgradeReport, UpgradeFailure> {
        let mut attempt = Attempt { states: Vec::new() };

        attempt.enter(UpgradeState::ReadingPackage);
        let package = match package::read(self.extractor, archive, &self.staging_root) {
            Ok(package) => package,
            Err(e) => return Err(attempt.fail(e.into())),
        };

        attempt.enter(UpgradeState::Validating);
        if let Err(e) = self.check_applicable(&package) {
            return Err(attempt.fail(e));
        }

        attempt.enter(UpgradeState::SelectingTarget);
        let target = match self
            .locator
            .active_root()
            .and_then(|active| self.locator.backup_root(&active))
        {
            Ok(target) => target,
            Err(e) => return Err(attempt.fail(e.into())),
        };

        self.apply(&package, target, attempt)
    }

    fn check_applicable(&self, package: &Package) -> Result<(), UpgradeFailure> {
        let applicable = match package.payload() {
            Payload::Os(os) => os.apply_ids.contains(self.device_id),
            // Multi-device packages are checked per blob while applying; here
            // only make sure at least one blob is meant for us.
            Payload::MultiOs(multi) => multi.blobs.iter().any(|b| b.applies_to(self.device_id)),
        };

        if !applicable {
            return Err(UpgradeFailure::NotApplicable {
                device_id: self.device_id,
            });
        }
        Ok(())
    }

    fn apply(
        &self,
        package: &Package,
        target: PartitionInfo,
        mut attempt: Attempt,
    ) -> Result<UpgradeReport, UpgradeFailure> {
        let staging = match StagingDir::create(&self.staging_root) {
            Ok(staging) => staging,
            Err(e) => return Err(attempt.fail(UpgradeFailure::Staging(e))),
        };

        let order = install_order(package);
        let mut installed = Vec::new();
        let mut skipped = Vec::new();
        let mut failed = Vec::new();
        let mut not_attempted = Vec::new();

        for (i, entry) in order.iter().enumerate() {
            let blob = entry.blob;

            if failed.iter().any(|f: &BlobFailure| f.kind.is_boot_critical()) {
                not_attempted.push(blob.name.clone());
                continue;
            }

            if let Some(ids) = entry.apply_ids {
                if !ids.contains(self.device_id) {
                    info!("skipping {} blob {}: not for this device", blob.kind, blob.name);
                    skipped.push(SkippedBlob {
                        name: blob.name.clone(),
                        kind: blob.kind,
                        reason: SkipReason::NotForDevice,
                    });
                    continue;
                }
            }

            if blob.kind == BlobKind::Other {
                warn!("skipping blob {}: no installer for this blob type", blob.name);
                skipped.push(SkippedBlob {
                    name: blob.name.clone(),
                    kind: blob.kind,
                    reason: SkipReason::NoHandler,
                });
                continue;
            }

            attempt.enter(UpgradeState::ApplyingBlob(i));
            match self.apply_blob(package.origin(), *entry, staging.path(), &target) {
                Ok(()) => {
                    info!("installed {} blob {}", blob.kind, blob.name);
                    installed.push(blob.name.clone());
                }
                Err(failure) => {
                    if blob.kind.is_boot_critical() {
                        error!("{}; aborting, the boot chain is incomplete", failure);
                    } else {
                        warn!("{}; continuing with remaining blobs", failure);
                    }
                    failed.push(failure);
                }
            }
        }

        if let Err(e) = staging.close() {
            warn!("failed to remove staging directory: {}", e);
        }

        if !failed.is_empty() {
            return Err(attempt.fail(UpgradeFailure::PartialFailure {
                failed,
                not_attempted,
            }));
        }

        attempt.enter(UpgradeState::Done);
        info!("upgrade finished, {} blob(s) installed to {}", installed.len(), target);
        Ok(UpgradeReport {
            package_type: package.package_type(),
            target,
            installed,
            skipped,
            states: attempt.states,
        })
    }

    /// Verify, extract, re-verify and install one blob.
    fn apply_blob(
        &self,
        archive: &Path,
        entry: BlobEntry<'_>,
        staging: &Path,
        target: &PartitionInfo,
    ) -> Result<(), BlobFailure> {
        let blob = entry.blob;
        let failure = |stage: BlobStage, reason: String| BlobFailure {
            name: blob.name.clone(),
            kind: blob.kind,
            stage,
            reason,
        };

        info!("checking md5sum of {} blob {}", blob.kind, blob.name);
        verify::verify_member(self.extractor, archive, &blob.name, &blob.checksum)
            .map_err(|e| failure(BlobStage::Verify, e.to_string()))?;

        info!("extracting {} blob {}", blob.kind, blob.name);
        let path = self
            .extractor
            .extract(archive, &blob.name, staging)
            .map_err(|e| failure(BlobStage::Extract, e.to_string()))?;

        // The extracted copy is what gets installed, so check it too.
        verify::verify_file(&path, &blob.name, &blob.checksum)
            .map_err(|e| failure(BlobStage::Verify, e.to_string()))?;

        let result = match blob.kind {
            BlobKind::Bootloader => self.installer.install_bootloader(&path, target),
            BlobKind::Kernel => self.installer.install_kernel(&path, target),
            BlobKind::Rootfs => self.installer.install_rootfs(&path, target),
            BlobKind::Other => Err(InstallError::NoHook(BlobKind::Other)),
        };

        // Images can be large; do not hold two of them in staging at once.
        if let Err(e) = fs::remove_file(&path) {
            warn!("failed to remove staged blob {}: {}", path.display(), e);
        }

        result.map_err(|e| failure(BlobStage::Install, e.to_string()))
    }
}
