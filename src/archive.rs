//! Package archive access.
//!
//! Packages are compressed tarballs. Members are pulled out with the host
//! `tar`, either into a directory or streamed into a writer so they can be
//! hashed without touching the disk.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CommandError, ExtractError};
use crate::process::Cmd;

/// Extracts named members from a package archive.
pub trait ArchiveExtractor {
    /// Extract `member` into `dest_dir`, returning the path of the extracted file.
    fn extract(&self, archive: &Path, member: &str, dest_dir: &Path)
        -> Result<PathBuf, ExtractError>;

    /// Copy the contents of `member` into `sink`, returning the byte count.
    fn stream(&self, archive: &Path, member: &str, sink: &mut dyn Write)
        -> Result<u64, ExtractError>;
}

/// Compression filter applied to the tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Zstd,
    Gzip,
    Xz,
    None,
}

impl Compression {
    /// Filter program handed to `tar -I`, if any.
    pub fn filter(self) -> Option<&'static str> {
        match self {
            Compression::Zstd => Some("zstd"),
            Compression::Gzip => Some("gzip"),
            Compression::Xz => Some("xz"),
            Compression::None => None,
        }
    }
}

impl FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "zstd" => Ok(Compression::Zstd),
            "gzip" => Ok(Compression::Gzip),
            "xz" => Ok(Compression::Xz),
            "none" => Ok(Compression::None),
            other => Err(format!(
                "unknown compression '{}' (expected zstd, gzip, xz or none)",
                other
            )),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filter().unwrap_or("none"))
    }
}

/// [`ArchiveExtractor`] backed by the host `tar`.
#[derive(Debug, Clone, Default)]
pub struct TarArchive {
    compression: Compression,
}

impl TarArchive {
    pub fn new(compression: Compression) -> Self {
        Self { compression }
    }

    fn base_cmd(&self) -> Cmd {
        let cmd = Cmd::new("tar");
        match self.compression.filter() {
            Some(filter) => cmd.args(["-I", filter]),
            None => cmd,
        }
    }

    fn map_error(&self, archive: &Path, member: &str, err: CommandError) -> ExtractError {
        match err {
            CommandError::Failed { ref stderr, .. } if stderr.contains("Not found in archive") => {
                ExtractError::NotFound {
                    archive: archive.to_path_buf(),
                    member: member.to_string(),
                }
            }
            other => ExtractError::Failed {
                archive: archive.to_path_buf(),
                member: member.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

impl ArchiveExtractor for TarArchive {
    fn extract(
        &self,
        archive: &Path,
        member: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, ExtractError> {
        self.base_cmd()
            .arg("-xf")
            .arg_path(archive)
            .arg("-C")
            .arg_path(dest_dir)
            .arg("--")
            .arg(member)
            .run()
            .map_err(|e| self.map_error(archive, member, e))?;

        let extracted = dest_dir.join(member);
        if !extracted.is_file() {
            return Err(ExtractError::Failed {
                archive: archive.to_path_buf(),
                member: member.to_string(),
                reason: "member is not a regular file".to_string(),
            });
        }
        Ok(extracted)
    }

    fn stream(
        &self,
        archive: &Path,
        member: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, ExtractError> {
        self.base_cmd()
            .arg("-O")
            .arg("-xf")
            .arg_path(archive)
            .arg("--")
            .arg(member)
            .stream_stdout(sink)
            .map_err(|e| self.map_error(archive, member, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn make_tar(dir: &Path, files: &[(&str, &[u8])]) -> PathBuf {
        let src = dir.join("src");
        fs::create_dir_all(&src).unwrap();
        for (name, content) in files {
            fs::write(src.join(name), content).unwrap();
        }
        let archive = dir.join("pkg.tar");
        let mut cmd = Cmd::new("tar").arg("-cf").arg_path(&archive).arg("-C").arg_path(&src);
        for (name, _) in files {
            cmd = cmd.arg(*name);
        }
        cmd.run().unwrap();
        archive
    }

    #[test]
    fn test_compression_from_str() {
        assert_eq!("zstd".parse::<Compression>(), Ok(Compression::Zstd));
        assert_eq!("none".parse::<Compression>(), Ok(Compression::None));
        assert!("lz4".parse::<Compression>().is_err());
        assert_eq!(Compression::default(), Compression::Zstd);
    }

    #[test]
    fn test_extract_member() {
        let tmp = TempDir::new().unwrap();
        let archive = make_tar(tmp.path(), &[("manifest.json", b"{}"), ("kernel.img", b"K")]);
        let dest = tmp.path().join("out");
        fs::create_dir_all(&dest).unwrap();

        let tar = TarArchive::new(Compression::None);
        let path = tar.extract(&archive, "manifest.json", &dest).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"{}");
        // Only the requested member is extracted
        assert!(!dest.join("kernel.img").exists());
    }

    #[test]
    fn test_stream_member() {
        let tmp = TempDir::new().unwrap();
        let archive = make_tar(tmp.path(), &[("kernel.img", b"kernel bytes")]);

        let mut sink = Vec::new();
        let n = TarArchive::new(Compression::None)
            .stream(&archive, "kernel.img", &mut sink)
            .unwrap();

        assert_eq!(n, 12);
        assert_eq!(sink, b"kernel bytes");
    }

    #[test]
    fn test_missing_member_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let archive = make_tar(tmp.path(), &[("kernel.img", b"K")]);

        let err = TarArchive::new(Compression::None)
            .stream(&archive, "rootfs.img", &mut Vec::new())
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound { .. }), "{err}");
    }

    #[test]
    fn test_missing_archive_is_failure() {
        let tmp = TempDir::new().unwrap();
        let err = TarArchive::new(Compression::None)
            .extract(&tmp.path().join("absent.tar"), "manifest.json", tmp.path())
            .unwrap_err();
        assert!(matches!(err, ExtractError::Failed { .. }), "{err}");
    }
}
