//! Configuration management for dualroot-upgrade.
//!
//! Reads configuration from a .env file and environment variables.
//! Environment variables take precedence over the .env file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::archive::Compression;
use crate::install::HookInstaller;
use crate::package::BlobKind;
use crate::partition::{RootPairs, DEFAULT_CMDLINE};

/// Default location of the single-attempt lock.
pub const DEFAULT_LOCK_FILE: &str = "/run/dualroot-upgrade.lock";

/// Every key this tool reads.
pub const KEYS: &[&str] = &[
    "UPGRADE_DEVICE_ID",
    "UPGRADE_CMDLINE",
    "UPGRADE_STAGING_DIR",
    "UPGRADE_ROOT_PAIRS",
    "UPGRADE_COMPRESSION",
    "UPGRADE_BOOTLOADER_HOOK",
    "UPGRADE_KERNEL_HOOK",
    "UPGRADE_ROOTFS_HOOK",
    "UPGRADE_LOCK_FILE",
];

/// Upgrade client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Identifier of this device, matched against package apply ids
    pub device_id: Option<u32>,
    /// Boot-parameter source (default: /proc/cmdline)
    pub cmdline: PathBuf,
    /// Parent of every per-attempt staging directory
    pub staging_dir: PathBuf,
    /// Explicit active/backup root pairing
    pub root_pairs: RootPairs,
    /// Compression of package archives
    pub compression: Compression,
    /// Per-kind install hooks
    pub hooks: HookInstaller,
    /// Lock serializing upgrade attempts
    pub lock_file: PathBuf,
}

impl Config {
    /// Load configuration from `env_file` (if it exists) and the environment.
    pub fn load(env_file: &Path) -> Result<Self> {
        let mut env_vars = HashMap::new();

        if env_file.exists() {
            let entries = dotenvy::from_path_iter(env_file)
                .with_context(|| format!("Failed to read {}", env_file.display()))?;
            for entry in entries {
                let (key, value) = entry
                    .with_context(|| format!("Failed to parse {}", env_file.display()))?;
                env_vars.insert(key, value);
            }
        }

        // Environment variables override .env file
        for key in KEYS {
            if let Ok(value) = std::env::var(key) {
                env_vars.insert(key.to_string(), value);
            }
        }

        Self::from_vars(&env_vars)
    }

    /// Build a config from already collected key/value pairs.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| {
            vars.get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let path = |key: &str| get(key).map(PathBuf::from);

        let device_id = get("UPGRADE_DEVICE_ID")
            .map(|v| {
                v.parse::<u32>()
                    .with_context(|| format!("UPGRADE_DEVICE_ID '{}' is not a device id", v))
            })
            .transpose()?;

        let root_pairs = match get("UPGRADE_ROOT_PAIRS") {
            Some(v) => v
                .parse::<RootPairs>()
                .map_err(|e| anyhow::anyhow!("UPGRADE_ROOT_PAIRS: {}", e))?,
            None => RootPairs::default(),
        };

        let compression = match get("UPGRADE_COMPRESSION") {
            Some(v) => v
                .parse::<Compression>()
                .map_err(|e| anyhow::anyhow!("UPGRADE_COMPRESSION: {}", e))?,
            None => Compression::default(),
        };

        Ok(Self {
            device_id,
            cmdline: path("UPGRADE_CMDLINE").unwrap_or_else(|| PathBuf::from(DEFAULT_CMDLINE)),
            staging_dir: path("UPGRADE_STAGING_DIR")
                .unwrap_or_else(|| std::env::temp_dir().join("dualroot-upgrade")),
            root_pairs,
            compression,
            hooks: HookInstaller {
                bootloader: path("UPGRADE_BOOTLOADER_HOOK"),
                kernel: path("UPGRADE_KERNEL_HOOK"),
                rootfs: path("UPGRADE_ROOTFS_HOOK"),
            },
            lock_file: path("UPGRADE_LOCK_FILE").unwrap_or_else(|| PathBuf::from(DEFAULT_LOCK_FILE)),
        })
    }

    /// The device id, which an upgrade cannot run without.
    pub fn require_device_id(&self) -> Result<u32> {
        match self.device_id {
            Some(id) => Ok(id),
            None => bail!("UPGRADE_DEVICE_ID is not set"),
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        println!("Configuration:");
        match self.device_id {
            Some(id) => println!("  UPGRADE_DEVICE_ID: {}", id),
            None => println!("  UPGRADE_DEVICE_ID: NOT SET"),
        }
        println!("  UPGRADE_CMDLINE: {}", self.cmdline.display());
        println!("  UPGRADE_STAGING_DIR: {}", self.staging_dir.display());
        if self.root_pairs.is_empty() {
            println!("  UPGRADE_ROOT_PAIRS: NOT SET (no backup root can be selected)");
        } else {
            let pairs: Vec<String> = self
                .root_pairs
                .iter()
                .map(|(a, b)| format!("{}:{}", a.display(), b.display()))
                .collect();
            println!("  UPGRADE_ROOT_PAIRS: {}", pairs.join(","));
        }
        println!("  UPGRADE_COMPRESSION: {}", self.compression);
        for (key, kind) in [
            ("UPGRADE_BOOTLOADER_HOOK", BlobKind::Bootloader),
            ("UPGRADE_KERNEL_HOOK", BlobKind::Kernel),
            ("UPGRADE_ROOTFS_HOOK", BlobKind::Rootfs),
        ] {
            match self.hooks.hook(kind) {
                Some(hook) => println!("  {}: {}", key, hook.display()),
                None => println!("  {}: NOT SET", key),
            }
        }
        println!("  UPGRADE_LOCK_FILE: {}", self.lock_file.display());
    }
}
