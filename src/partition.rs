//! Dual-root partition discovery.
//!
//! The running root comes from the kernel command line (`root=` and
//! `rootfstype=`). The backup root is never guessed from the active one: it
//! comes from an explicit per-device pairing such as
//!
//! ```text
//! /dev/mmcblk0p2:/dev/mmcblk0p3
//! ```
//!
//! which is symmetric, so whichever side is booted, the other is the target.

use std::fmt;
use std::fs;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::LocatorError;

/// Default boot-parameter source.
pub const DEFAULT_CMDLINE: &str = "/proc/cmdline";

/// Root filesystem types an A/B root may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FsType {
    Ext2,
    Ext3,
    Ext4,
    Btrfs,
    Xfs,
    F2fs,
    Squashfs,
    Erofs,
    Ubifs,
    Jffs2,
}

const FS_TYPES: &[(FsType, &str)] = &[
    (FsType::Ext2, "ext2"),
    (FsType::Ext3, "ext3"),
    (FsType::Ext4, "ext4"),
    (FsType::Btrfs, "btrfs"),
    (FsType::Xfs, "xfs"),
    (FsType::F2fs, "f2fs"),
    (FsType::Squashfs, "squashfs"),
    (FsType::Erofs, "erofs"),
    (FsType::Ubifs, "ubifs"),
    (FsType::Jffs2, "jffs2"),
];

impl FsType {
    pub fn name(self) -> &'static str {
        FS_TYPES
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }
}

impl FromStr for FsType {
    type Err = LocatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FS_TYPES
            .iter()
            .find(|(_, n)| *n == s)
            .map(|(t, _)| *t)
            .ok_or_else(|| LocatorError::UnsupportedFs(s.to_string()))
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A root partition: its device node and filesystem type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartitionInfo {
    pub device: PathBuf,
    pub fs_type: FsType,
}

impl fmt::Display for PartitionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.device.display(), self.fs_type)
    }
}

/// Parsed kernel command line.
#[derive(Debug, Clone, Default)]
pub struct BootParams {
    params: Vec<(String, Option<String>)>,
}

impl BootParams {
    /// Split a command line on whitespace into `key=value` pairs.
    /// Tokens without `=` are kept as bare flags.
    pub fn parse(line: &str) -> Self {
        let params = line
            .split_whitespace()
            .map(|token| match token.split_once('=') {
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (token.to_string(), None),
            })
            .collect();
        Self { params }
    }

    /// Value of `key`. When repeated, the last occurrence wins, as in the kernel.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }
}

/// Decides whether a path is a device node.
pub trait DeviceProbe {
    fn is_device(&self, path: &Path) -> bool;
}

/// [`DeviceProbe`] that stats the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct SysDeviceProbe;

impl DeviceProbe for SysDeviceProbe {
    fn is_device(&self, path: &Path) -> bool {
        fs::metadata(path)
            .map(|m| {
                let ft = m.file_type();
                ft.is_block_device() || ft.is_char_device()
            })
            .unwrap_or(false)
    }
}

/// Explicit active/backup root pairing for a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootPairs {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl RootPairs {
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &Path)> {
        self.pairs.iter().map(|(a, b)| (a.as_path(), b.as_path()))
    }

    /// The other half of the pair containing `device`.
    pub fn companion(&self, device: &Path) -> Option<&Path> {
        self.pairs.iter().find_map(|(a, b)| {
            if a == device {
                Some(b.as_path())
            } else if b == device {
                Some(a.as_path())
            } else {
                None
            }
        })
    }
}

impl FromStr for RootPairs {
    type Err = String;

    /// Parse `A:B[,C:D...]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pairs = Vec::new();
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            let (a, b) = item
                .split_once(':')
                .ok_or_else(|| format!("'{}' is not of the form ACTIVE:BACKUP", item))?;
            let (a, b) = (a.trim(), b.trim());
            if a.is_empty() || b.is_empty() || a == b || b.contains(':') {
                return Err(format!("'{}' is not a valid root pair", item));
            }
            pairs.push((PathBuf::from(a), PathBuf::from(b)));
        }
        Ok(Self { pairs })
    }
}

/// Resolves the active and backup root partitions.
pub struct PartitionLocator {
    cmdline: PathBuf,
    pairs: RootPairs,
    probe: Box<dyn DeviceProbe>,
}

impl PartitionLocator {
    pub fn new(cmdline: impl Into<PathBuf>, pairs: RootPairs) -> Self {
        Self::with_probe(cmdline, pairs, Box::new(SysDeviceProbe))
    }

    pub fn with_probe(
        cmdline: impl Into<PathBuf>,
        pairs: RootPairs,
        probe: Box<dyn DeviceProbe>,
    ) -> Self {
        Self {
            cmdline: cmdline.into(),
            pairs,
            probe,
        }
    }

    /// The root the system is running from.
    pub fn active_root(&self) -> Result<PartitionInfo, LocatorError> {
        let line = fs::read_to_string(&self.cmdline).map_err(|source| LocatorError::Unreadable {
            path: self.cmdline.clone(),
            source,
        })?;
        debug!(cmdline = line.trim(), "read boot parameters");
        self.active_root_from(&line)
    }

    /// The root described by a boot-parameter line.
    pub fn active_root_from(&self, line: &str) -> Result<PartitionInfo, LocatorError> {
        let params = BootParams::parse(line);
        let root = params.get("root").ok_or(LocatorError::Incomplete("root"))?;
        let fs_type = params
            .get("rootfstype")
            .ok_or(LocatorError::Incomplete("rootfstype"))?;

        let fs_type = fs_type.parse::<FsType>()?;
        let device = PathBuf::from(root);
        if !self.probe.is_device(&device) {
            return Err(LocatorError::NotADevice(device));
        }

        Ok(PartitionInfo { device, fs_type })
    }

    /// The companion of `active`, which upgrades are written to.
    pub fn backup_root(&self, active: &PartitionInfo) -> Result<PartitionInfo, LocatorError> {
        let device = self
            .pairs
            .companion(&active.device)
            .ok_or_else(|| LocatorError::NoCompanion(active.device.clone()))?
            .to_path_buf();

        if !self.probe.is_device(&device) {
            return Err(LocatorError::NotADevice(device));
        }

        let backup = PartitionInfo {
            device,
            fs_type: active.fs_type,
        };
        info!("active root {}, backup root {}", active, backup);
        Ok(backup)
    }
}
