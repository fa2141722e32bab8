//! Install hooks.
//!
//! Writing a verified blob to the backup partition, or switching the
//! bootloader, is device specific. The orchestrator only calls through
//! [`Installer`]; [`HookInstaller`] forwards each call to an executable
//! configured per blob kind.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::InstallError;
use crate::package::BlobKind;
use crate::partition::PartitionInfo;
use crate::process::Cmd;

/// Installs verified, extracted blobs onto the target partition.
pub trait Installer {
    fn install_bootloader(&self, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError>;

    fn install_kernel(&self, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError>;

    fn install_rootfs(&self, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError>;
}

/// Runs `<hook> <blob-path> <target-device> <target-fstype>` for each blob.
#[derive(Debug, Clone, Default)]
pub struct HookInstaller {
    pub bootloader: Option<PathBuf>,
    pub kernel: Option<PathBuf>,
    pub rootfs: Option<PathBuf>,
}

impl HookInstaller {
    /// The hook configured for `kind`, if any.
    pub fn hook(&self, kind: BlobKind) -> Option<&Path> {
        match kind {
            BlobKind::Bootloader => self.bootloader.as_deref(),
            BlobKind::Kernel => self.kernel.as_deref(),
            BlobKind::Rootfs => self.rootfs.as_deref(),
            BlobKind::Other => None,
        }
    }

    fn run_hook(&self, kind: BlobKind, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError> {
        let hook = self.hook(kind).ok_or(InstallError::NoHook(kind))?;
        info!(
            "installing {} from {} to {} with {}",
            kind,
            blob.display(),
            target,
            hook.display()
        );
        Cmd::new(hook)
            .arg_path(blob)
            .arg_path(&target.device)
            .arg(target.fs_type.name())
            .run()
            .map_err(|source| InstallError::Hook { kind, source })?;
        Ok(())
    }
}

impl Installer for HookInstaller {
    fn install_bootloader(&self, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError> {
        self.run_hook(BlobKind::Bootloader, blob, target)
    }

    fn install_kernel(&self, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError> {
        self.run_hook(BlobKind::Kernel, blob, target)
    }

    fn install_rootfs(&self, blob: &Path, target: &PartitionInfo) -> Result<(), InstallError> {
        self.run_hook(BlobKind::Rootfs, blob, target)
    }
}
