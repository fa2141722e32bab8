//! Error taxonomy for the upgrade client.
//!
//! Each stage of an upgrade attempt owns one error enum. Every variant carries
//! enough context (archive, blob, field or device) for an operator to tell
//! what went wrong without a debugger.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::package::{BlobKind, PackageType, ParseError};

/// Failure of an external command.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started at all.
    #[error("failed to execute '{program}': {source}. Is it installed?")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' failed (exit code {code}){}", fmt_stderr(.stderr))]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },

    /// Copying the program's output failed.
    #[error("I/O error while reading output of '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn fmt_stderr(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(":\n{}", stderr)
    }
}

/// Failure of the archive extraction collaborator.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The archive was readable but does not contain the member.
    #[error("'{member}' not found in {}", .archive.display())]
    NotFound { archive: PathBuf, member: String },

    /// The archive (or member) could not be read or written out.
    #[error("failed to extract '{member}' from {}: {reason}", .archive.display())]
    Failed {
        archive: PathBuf,
        member: String,
        reason: String,
    },
}

/// Failure of the manifest reader.
#[derive(Error, Debug)]
pub enum PackageError {
    /// The manifest could not be pulled out of the archive.
    #[error("package {} is unreadable: {source}", .archive.display())]
    Unreadable {
        archive: PathBuf,
        #[source]
        source: ExtractError,
    },

    /// The manifest is not valid JSON or violates the manifest schema.
    #[error("malformed manifest field '{field}': {reason}")]
    Malformed { field: String, reason: String },

    /// The `type` field is missing or names no known package type.
    #[error("unknown package type {}", fmt_type_name(.0))]
    UnknownType(Option<String>),

    /// The package type is recognized but this client cannot apply it.
    #[error("package type '{0}' is not supported")]
    Unsupported(PackageType),

    /// The private staging directory could not be prepared.
    #[error("failed to prepare staging directory: {0}")]
    Staging(#[source] io::Error),
}

impl PackageError {
    pub(crate) fn malformed(field: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            field: field.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, err: ParseError) -> Self {
        Self::malformed(field, err)
    }
}

fn fmt_type_name(name: &Option<String>) -> String {
    match name {
        Some(name) => format!("'{}'", name),
        None => "(missing)".to_string(),
    }
}

/// Failure of the integrity verifier.
#[derive(Error, Debug)]
pub enum VerifyError {
    /// The digest of the data differs from the declared checksum.
    #[error("checksum mismatch for '{name}': expected {expected}, got {actual}")]
    Mismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// The member or file could not be read.
    #[error("cannot read '{name}' for verification: {reason}")]
    Unreadable { name: String, reason: String },
}

/// Failure of the partition locator.
#[derive(Error, Debug)]
pub enum LocatorError {
    /// The boot-parameter source could not be read.
    #[error("cannot read boot parameters from {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The boot parameters lack `root=` or `rootfstype=`.
    #[error("boot parameters are missing '{0}='")]
    Incomplete(&'static str),

    /// The `root=` path is not a block or character device.
    #[error("{} is not a device node", .0.display())]
    NotADevice(PathBuf),

    /// The `rootfstype=` value is not in the supported set.
    #[error("unsupported root filesystem type '{0}'")]
    UnsupportedFs(String),

    /// No companion partition is configured for the active root.
    #[error("no backup partition configured for active root {}", .0.display())]
    NoCompanion(PathBuf),
}

/// Failure of an install hook.
#[derive(Error, Debug)]
pub enum InstallError {
    /// No hook is configured for this blob kind.
    #[error("no install hook configured for {0} blobs")]
    NoHook(BlobKind),

    /// The hook ran and failed.
    #[error("{kind} install hook failed: {source}")]
    Hook {
        kind: BlobKind,
        #[source]
        source: CommandError,
    },
}

/// Terminal failure of an upgrade attempt.
#[derive(Error, Debug)]
pub enum UpgradeFailure {
    /// The package could not be read or validated.
    #[error("invalid package: {0}")]
    InvalidPackage(#[from] PackageError),

    /// The package is not meant for this device.
    #[error("package does not apply to device {device_id}")]
    NotApplicable { device_id: u32 },

    /// The backup partition could not be resolved.
    #[error("no installation target: {0}")]
    NoTarget(#[from] LocatorError),

    /// One or more blobs did not install.
    #[error("{} blob(s) failed to install{}", .failed.len(), fmt_not_attempted(.not_attempted))]
    PartialFailure {
        failed: Vec<BlobFailure>,
        not_attempted: Vec<String>,
    },

    /// The staging directory for blob extraction could not be created.
    #[error("failed to prepare staging directory: {0}")]
    Staging(#[source] io::Error),
}

fn fmt_not_attempted(names: &[String]) -> String {
    if names.is_empty() {
        String::new()
    } else {
        format!(", aborted before {}", names.join(", "))
    }
}

/// Stage of a blob's installation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStage {
    Extract,
    Verify,
    Install,
}

impl std::fmt::Display for BlobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BlobStage::Extract => "extract",
            BlobStage::Verify => "verify",
            BlobStage::Install => "install",
        })
    }
}

/// One blob that did not install, and why.
#[derive(Error, Debug)]
#[error("{kind} blob '{name}' failed at {stage}: {reason}")]
pub struct BlobFailure {
    pub name: String,
    pub kind: BlobKind,
    pub stage: BlobStage,
    pub reason: String,
}
