//! Shared test utilities for dualroot-upgrade tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use dualroot_upgrade::install::HookInstaller;
use dualroot_upgrade::partition::{DeviceProbe, PartitionLocator, RootPairs};
use dualroot_upgrade::verify::digest_reader;

pub const ROOT_A: &str = "/dev/mmcblk0p2";
pub const ROOT_B: &str = "/dev/mmcblk0p3";

/// Test environment with temporary directories for packages, staging and hooks.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Base directory
    pub base_dir: PathBuf,
    /// Parent of per-attempt staging directories
    pub staging: PathBuf,
    /// Stand-in for the backup partition; hooks copy blobs here
    pub partition: PathBuf,
    /// Boot-parameter file
    pub cmdline: PathBuf,
}

impl TestEnv {
    /// Create a new test environment booted from root A.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_dir = temp_dir.path().to_path_buf();

        let staging = base_dir.join("staging");
        let partition = base_dir.join("partition");
        let cmdline = base_dir.join("cmdline");

        fs::create_dir_all(&partition).expect("Failed to create partition dir");

        let env = Self {
            _temp_dir: temp_dir,
            base_dir,
            staging,
            partition,
            cmdline,
        };
        env.boot_from(ROOT_A);
        env
    }

    /// Rewrite the boot parameters to claim `root` is running.
    pub fn boot_from(&self, root: &str) {
        fs::write(
            &self.cmdline,
            format!("console=ttyS0,115200 root={} rootfstype=ext4 rw\n", root),
        )
        .expect("Failed to write cmdline");
    }

    /// Locator over this environment's cmdline with the A/B pair configured.
    pub fn locator(&self) -> PartitionLocator {
        let pairs: RootPairs = format!("{}:{}", ROOT_A, ROOT_B).parse().unwrap();
        PartitionLocator::with_probe(&self.cmdline, pairs, Box::new(DevProbe))
    }

    /// Hooks for all three kinds that copy the blob into `partition/` and
    /// append `<kind> <blob> <device> <fstype>` to `partition/hooks.log`.
    pub fn copying_hooks(&self) -> HookInstaller {
        HookInstaller {
            bootloader: Some(self.write_copy_hook("bootloader")),
            kernel: Some(self.write_copy_hook("kernel")),
            rootfs: Some(self.write_copy_hook("rootfs")),
        }
    }

    fn write_copy_hook(&self, kind: &str) -> PathBuf {
        let body = format!(
            "cp \"$1\" '{dir}/'\necho \"{kind} $(basename \"$1\") $2 $3\" >> '{dir}/hooks.log'",
            dir = self.partition.display(),
            kind = kind
        );
        write_script(&self.base_dir.join(format!("{}-hook", kind)), &body)
    }

    /// A hook that fails with `message` on stderr.
    pub fn failing_hook(&self, name: &str, message: &str) -> PathBuf {
        write_script(
            &self.base_dir.join(name),
            &format!("echo '{}' >&2\nexit 1", message),
        )
    }

    /// Lines the copying hooks logged, in call order.
    pub fn hook_log(&self) -> Vec<String> {
        fs::read_to_string(self.partition.join("hooks.log"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Entries left under the staging root.
    pub fn staging_entries(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.staging)
            .map(|rd| rd.map(|e| e.unwrap().path()).collect())
            .unwrap_or_default()
    }
}

/// Anything under /dev counts as a device node.
pub struct DevProbe;

impl DeviceProbe for DevProbe {
    fn is_device(&self, path: &Path) -> bool {
        path.starts_with("/dev")
    }
}

/// Write an executable /bin/sh script.
pub fn write_script(path: &Path, body: &str) -> PathBuf {
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).expect("Failed to write script");
    let mut perms = fs::metadata(path).expect("Failed to get metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("Failed to set permissions");
    path.to_path_buf()
}

/// Hex MD5 digest of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    let mut reader = data;
    digest_reader(&mut reader).unwrap().to_hex()
}

/// Build an uncompressed package tarball at `dir/name` from `manifest` and `files`.
pub fn build_package(dir: &Path, name: &str, manifest: &str, files: &[(&str, &[u8])]) -> PathBuf {
    let src = dir.join(format!("{}.d", name));
    fs::create_dir_all(&src).expect("Failed to create package source dir");
    fs::write(src.join("manifest.json"), manifest).expect("Failed to write manifest");
    for (file, data) in files {
        fs::write(src.join(file), data).expect("Failed to write blob");
    }

    let archive = dir.join(name);
    let status = Command::new("tar")
        .arg("-cf")
        .arg(&archive)
        .arg("-C")
        .arg(&src)
        .arg("manifest.json")
        .args(files.iter().map(|(file, _)| *file))
        .status()
        .expect("Failed to run tar");
    assert!(status.success(), "tar failed to build {}", archive.display());
    archive
}

/// Manifest JSON for an `os` package over `blobs` of (name, type, contents).
pub fn os_manifest(apply_ids: &[u32], blobs: &[(&str, &str, &[u8])]) -> String {
    let ids: Vec<String> = apply_ids.iter().map(|id| id.to_string()).collect();
    let entries: Vec<String> = blobs
        .iter()
        .map(|(name, kind, data)| {
            format!(
                r#"{{"name":"{}","type":"{}","md5sum":"{}"}}"#,
                name,
                kind,
                md5_hex(data)
            )
        })
        .collect();
    format!(
        r#"{{"type":"os","version":"3.1.0.b7","apply id":[{}],"blobs":[{}]}}"#,
        ids.join(","),
        entries.join(",")
    )
}

/// Assert that a file holds exactly `expected`.
pub fn assert_file_bytes(path: &Path, expected: &[u8]) {
    let content = fs::read(path).unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));
    assert_eq!(
        content,
        expected,
        "File {} does not hold the expected bytes",
        path.display()
    );
}

/// Assert that a file does not exist.
pub fn assert_file_missing(path: &Path) {
    assert!(
        !path.exists(),
        "Expected file to be absent: {}",
        path.display()
    );
}
