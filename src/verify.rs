//! Blob integrity checks.
//!
//! The manifest's MD5 sums catch truncated transfers and storage corruption.
//! They are not a signature: a package that passes here is intact, not trusted.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use md5::{Digest, Md5};
use tracing::{debug, info};

use crate::archive::ArchiveExtractor;
use crate::error::VerifyError;
use crate::package::{Checksum, Package, CHECKSUM_LEN};

fn finish(hasher: Md5) -> Checksum {
    let mut bytes = [0u8; CHECKSUM_LEN];
    bytes.copy_from_slice(&hasher.finalize());
    Checksum::from_bytes(bytes)
}

fn compare(name: &str, expected: &Checksum, actual: Checksum) -> Result<(), VerifyError> {
    if actual != *expected {
        return Err(VerifyError::Mismatch {
            name: name.to_string(),
            expected: expected.to_hex(),
            actual: actual.to_hex(),
        });
    }
    debug!(name, checksum = %actual, "checksum ok");
    Ok(())
}

/// Digest everything `reader` yields.
pub fn digest_reader(reader: &mut dyn Read) -> io::Result<Checksum> {
    let mut hasher = Md5::new();
    io::copy(reader, &mut hasher)?;
    Ok(finish(hasher))
}

/// Verify an archive member by streaming it through the digest, without
/// extracting it to disk.
pub fn verify_member(
    extractor: &dyn ArchiveExtractor,
    archive: &Path,
    member: &str,
    expected: &Checksum,
) -> Result<(), VerifyError> {
    let mut hasher = Md5::new();
    extractor
        .stream(archive, member, &mut hasher)
        .map_err(|e| VerifyError::Unreadable {
            name: member.to_string(),
            reason: e.to_string(),
        })?;
    compare(member, expected, finish(hasher))
}

/// Verify a file already extracted to disk. `name` is used in errors.
pub fn verify_file(path: &Path, name: &str, expected: &Checksum) -> Result<(), VerifyError> {
    let unreadable = |e: io::Error| VerifyError::Unreadable {
        name: name.to_string(),
        reason: format!("{}: {}", path.display(), e),
    };

    let mut file = File::open(path).map_err(unreadable)?;
    let actual = digest_reader(&mut file).map_err(unreadable)?;
    compare(name, expected, actual)
}

/// Outcome of checking one blob during a package sweep.
#[derive(Debug)]
pub struct BlobCheck {
    pub name: String,
    pub result: Result<(), VerifyError>,
}

/// Stream every blob of `package` through the verifier.
///
/// All blobs are checked even after a failure, so the caller sees the full
/// picture.
pub fn verify_package(extractor: &dyn ArchiveExtractor, package: &Package) -> Vec<BlobCheck> {
    package
        .entries()
        .into_iter()
        .map(|entry| {
            let blob = entry.blob;
            info!("checking md5sum of {} blob {}", blob.kind, blob.name);
            BlobCheck {
                name: blob.name.clone(),
                result: verify_member(extractor, package.origin(), &blob.name, &blob.checksum),
            }
        })
        .collect()
}
