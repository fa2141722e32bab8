//! Single-attempt lock.
//!
//! Only one upgrade may run on a device at a time. The lock is an advisory
//! `flock` on a file that also records the holder's pid. The kernel drops the
//! lock when the holder exits, so a crashed attempt never blocks the next one.
//! The file itself stays in place.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another upgrade is in progress (lock {path} held by pid {holder})", path = .path.display())]
    Held { path: PathBuf, holder: String },

    #[error("failed to take lock {path}: {source}", path = .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Guard for a held upgrade lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct UpgradeLock {
    path: PathBuf,
    file: File,
}

fn try_flock(file: &File) -> io::Result<()> {
    // SAFETY: the descriptor belongs to `file`, which outlives the call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

impl UpgradeLock {
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        match try_flock(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let mut holder = String::new();
                let _ = file.read_to_string(&mut holder);
                let holder = holder.trim();
                return Err(LockError::Held {
                    path: path.to_path_buf(),
                    holder: if holder.is_empty() {
                        "unknown".to_string()
                    } else {
                        holder.to_string()
                    },
                });
            }
            Err(e) => return Err(io_err(e)),
        }

        // Whatever a dead holder left behind is overwritten.
        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        writeln!(file, "{}", std::process::id()).map_err(io_err)?;
        debug!("acquired upgrade lock {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for UpgradeLock {
    fn drop(&mut self) {
        // Unlinking would let a waiter lock an inode nobody else can find.
        if let Err(e) = self.file.set_len(0) {
            warn!("failed to clear upgrade lock {}: {}", self.path.display(), e);
        }
        // Closing the file releases the flock.
    }
}
