//! Per-attempt staging directories.
//!
//! Every read or install step extracts into a private directory with a
//! random name. The directory and everything below it is removed when the
//! [`StagingDir`] is dropped, on success and on every error path alike.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name prefix shared by all staging directories.
pub const STAGING_PREFIX: &str = ".upgrade-";

/// A private extraction area, removed on drop.
#[derive(Debug)]
pub struct StagingDir {
    dir: TempDir,
}

impl StagingDir {
    /// Create a fresh staging directory under `parent_dir`.
    ///
    /// `parent_dir` is created if it does not exist yet.
    pub fn create(parent_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(parent_dir)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent_dir)?;
        debug!(path = %dir.path().display(), "created staging directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory now, reporting errors instead of ignoring them.
    pub fn close(self) -> io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = %path.display(), "removed staging directory");
        Ok(())
    }
}

/// Remove staging directories left behind by attempts that were killed.
///
/// Only direct children of `parent_dir` carrying [`STAGING_PREFIX`] are
/// touched. Must not run while an upgrade attempt is in flight.
pub fn clean_stale(parent_dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    if !parent_dir.is_dir() {
        return Ok(removed);
    }

    for entry in WalkDir::new(parent_dir).min_depth(1).max_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("skipping unreadable entry in {}: {}", parent_dir.display(), e);
                continue;
            }
        };

        let is_staging = entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
        if !is_staging {
            continue;
        }

        fs::remove_dir_all(entry.path())?;
        removed.push(entry.path().to_path_buf());
    }

    Ok(removed)
}
