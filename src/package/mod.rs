//! Upgrade packages: the manifest model and the reader that builds it.

pub mod reader;
mod types;

pub use reader::{parse_manifest, read, MANIFEST_NAME};
pub use types::{
    validate_blob_name, ApplyIds, Blob, BlobEntry, BlobKind, Checksum, MultiBlob, MultiOsPayload,
    OsPayload, Package, PackageType, PackageWarning, ParseError, Payload, Version, CHECKSUM_LEN,
    MAX_BLOB_NAME_LEN, MAX_BUILD_TAG_LEN,
};
