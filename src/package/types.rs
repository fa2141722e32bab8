//! Manifest data model.
//!
//! Pure values with validating constructors. Nothing here touches the
//! filesystem; see [`super::reader`] for how a [`Package`] is built from an
//! archive.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Blob names must be shorter than this many bytes.
pub const MAX_BLOB_NAME_LEN: usize = 128;

/// Longest accepted build tag in a version string.
pub const MAX_BUILD_TAG_LEN: usize = 16;

/// Raw length of an MD5 digest.
pub const CHECKSUM_LEN: usize = 16;

/// Validation failure for a single manifest value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("version '{0}' is not of the form MAJOR.MINOR.PATCH.BUILD")]
    VersionFormat(String),

    #[error("version component '{0}' is not an integer in 0..=255")]
    VersionComponent(String),

    #[error("build tag is longer than {} characters", MAX_BUILD_TAG_LEN)]
    BuildTooLong,

    #[error("checksum must be {} hex digits, got {0}", CHECKSUM_LEN * 2)]
    ChecksumLength(usize),

    #[error("checksum contains non-hex character {0:?}")]
    ChecksumChar(char),

    #[error("blob name is empty")]
    NameEmpty,

    #[error("blob name is {0} bytes, limit is {}", MAX_BLOB_NAME_LEN - 1)]
    NameTooLong(usize),

    #[error("blob name '{0}' is not a plain relative path")]
    NameUnsafe(String),

    #[error("apply id list is empty")]
    EmptyApplyIds,
}

/// Package types known to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    /// OS image for one device family: bootloader, kernel, rootfs.
    Os,
    /// Incremental patch.
    Patch,
    /// OS images for several device families, selected per blob.
    MultiOs,
    /// Incremental patches for several device families.
    MultiPatch,
}

const PACKAGE_TYPE_NAMES: &[(PackageType, &str)] = &[
    (PackageType::Os, "os"),
    (PackageType::Patch, "patch"),
    (PackageType::MultiOs, "multi-os"),
    (PackageType::MultiPatch, "multi-patch"),
];

impl PackageType {
    /// Look up a manifest type name. Unknown names return `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        PACKAGE_TYPE_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(t, _)| *t)
    }

    pub fn name(self) -> &'static str {
        PACKAGE_TYPE_NAMES
            .iter()
            .find(|(t, _)| *t == self)
            .map(|(_, n)| *n)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// What a blob installs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    Bootloader,
    Kernel,
    Rootfs,
    /// Any asset this client does not act on.
    Other,
}

impl BlobKind {
    /// Map a manifest blob type. Unrecognized names are `Other`, not an error.
    pub fn from_name(name: &str) -> Self {
        match name {
            "bootloader" => BlobKind::Bootloader,
            "kernel" => BlobKind::Kernel,
            "rootfs" => BlobKind::Rootfs,
            _ => BlobKind::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BlobKind::Bootloader => "bootloader",
            BlobKind::Kernel => "kernel",
            BlobKind::Rootfs => "rootfs",
            BlobKind::Other => "other",
        }
    }

    /// Installation rank: bootloader, kernel, rootfs, then everything else.
    pub fn install_rank(self) -> u8 {
        match self {
            BlobKind::Bootloader => 0,
            BlobKind::Kernel => 1,
            BlobKind::Rootfs => 2,
            BlobKind::Other => 3,
        }
    }

    /// A failure of this kind leaves the boot chain unusable.
    pub fn is_boot_critical(self) -> bool {
        matches!(self, BlobKind::Bootloader | BlobKind::Kernel)
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Package or blob version, `MAJOR.MINOR.PATCH.BUILD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
    pub build: String,
}

impl Version {
    /// Parse a dotted quad such as `1.4.2.20240611`.
    pub fn parse(s: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = s.split('.').collect();
        let [major, minor, patch, build] = parts.as_slice() else {
            return Err(ParseError::VersionFormat(s.to_string()));
        };

        if build.is_empty() {
            return Err(ParseError::VersionFormat(s.to_string()));
        }
        if build.len() > MAX_BUILD_TAG_LEN {
            return Err(ParseError::BuildTooLong);
        }

        Ok(Self {
            major: parse_component(major)?,
            minor: parse_component(minor)?,
            patch: parse_component(patch)?,
            build: build.to_string(),
        })
    }
}

fn parse_component(s: &str) -> Result<u8, ParseError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::VersionComponent(s.to_string()));
    }
    s.parse::<u8>()
        .map_err(|_| ParseError::VersionComponent(s.to_string()))
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.build)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// MD5 digest of a blob.
///
/// The manifest carries it as 32 hex digits, the same text `md5sum` prints.
/// Decoding is strict: wrong length or any non-hex character is rejected.
/// This detects corruption only; it says nothing about who built the package.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum([u8; CHECKSUM_LEN]);

impl Checksum {
    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        if s.len() != CHECKSUM_LEN * 2 {
            return Err(ParseError::ChecksumLength(s.chars().count()));
        }

        let mut bytes = [0u8; CHECKSUM_LEN];
        let digits = s.as_bytes();
        for (i, byte) in bytes.iter_mut().enumerate() {
            let hi = hex_value(digits[2 * i])?;
            let lo = hex_value(digits[2 * i + 1])?;
            *byte = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: [u8; CHECKSUM_LEN]) -> Self {
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

fn hex_value(c: u8) -> Result<u8, ParseError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(ParseError::ChecksumChar(c as char)),
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({})", self.to_hex())
    }
}

impl Serialize for Checksum {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Non-empty set of device identifiers a package or blob is meant for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ApplyIds(BTreeSet<u32>);

impl ApplyIds {
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Result<Self, ParseError> {
        let ids: BTreeSet<u32> = ids.into_iter().collect();
        if ids.is_empty() {
            return Err(ParseError::EmptyApplyIds);
        }
        Ok(Self(ids))
    }

    pub fn contains(&self, device_id: u32) -> bool {
        self.0.contains(&device_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Check that a manifest-supplied name is safe to join onto a staging directory.
pub fn validate_blob_name(name: &str) -> Result<(), ParseError> {
    if name.is_empty() {
        return Err(ParseError::NameEmpty);
    }
    if name.len() >= MAX_BLOB_NAME_LEN {
        return Err(ParseError::NameTooLong(name.len()));
    }
    if name.contains('\0') || name.ends_with('/') {
        return Err(ParseError::NameUnsafe(name.to_string()));
    }

    let path = Path::new(name);
    let plain = path.components().all(|c| matches!(c, Component::Normal(_)));
    // `Path::components` drops interior "." and repeated separators; reject them too.
    let normalized = name.split('/').all(|seg| !seg.is_empty() && seg != ".");
    if !plain || !normalized {
        return Err(ParseError::NameUnsafe(name.to_string()));
    }
    Ok(())
}

/// One installable component of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Blob {
    pub kind: BlobKind,
    pub name: String,
    #[serde(rename = "md5sum")]
    pub checksum: Checksum,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
}

impl Blob {
    pub fn new(
        kind: BlobKind,
        name: impl Into<String>,
        checksum: Checksum,
        version: Option<Version>,
    ) -> Result<Self, ParseError> {
        let name = name.into();
        validate_blob_name(&name)?;
        Ok(Self {
            kind,
            name,
            checksum,
            version,
        })
    }
}

/// Blob of a multi-device package, with its own applicability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiBlob {
    #[serde(flatten)]
    pub blob: Blob,
    #[serde(rename = "apply id")]
    pub apply_ids: ApplyIds,
}

impl MultiBlob {
    pub fn applies_to(&self, device_id: u32) -> bool {
        self.apply_ids.contains(device_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsPayload {
    #[serde(rename = "apply id")]
    pub apply_ids: ApplyIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<Version>,
    pub blobs: Vec<Blob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiOsPayload {
    pub blobs: Vec<MultiBlob>,
}

/// Type-specific content of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Os(OsPayload),
    MultiOs(MultiOsPayload),
}

/// A blob together with the device ids it is restricted to, if any.
#[derive(Debug, Clone, Copy)]
pub struct BlobEntry<'a> {
    pub blob: &'a Blob,
    /// `None` for single-device packages, where applicability is package-wide.
    pub apply_ids: Option<&'a ApplyIds>,
}

impl Payload {
    pub fn package_type(&self) -> PackageType {
        match self {
            Payload::Os(_) => PackageType::Os,
            Payload::MultiOs(_) => PackageType::MultiOs,
        }
    }

    /// Blobs in manifest order.
    pub fn entries(&self) -> Vec<BlobEntry<'_>> {
        match self {
            Payload::Os(os) => os
                .blobs
                .iter()
                .map(|blob| BlobEntry {
                    blob,
                    apply_ids: None,
                })
                .collect(),
            Payload::MultiOs(multi) => multi
                .blobs
                .iter()
                .map(|mb| BlobEntry {
                    blob: &mb.blob,
                    apply_ids: Some(&mb.apply_ids),
                })
                .collect(),
        }
    }
}

/// Non-fatal fact noticed while reading a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "kebab-case")]
pub enum PackageWarning {
    /// The package-level version string did not parse; the package is used
    /// without a version.
    UnparsableVersion { value: String, reason: String },
}

impl fmt::Display for PackageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageWarning::UnparsableVersion { value, reason } => {
                write!(f, "package version '{}' ignored: {}", value, reason)
            }
        }
    }
}

/// A validated upgrade package.
///
/// The type is fixed from the payload at construction and has no setter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    #[serde(rename = "type")]
    package_type: PackageType,
    origin: PathBuf,
    #[serde(flatten)]
    payload: Payload,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<PackageWarning>,
}

impl Package {
    pub fn new(origin: impl Into<PathBuf>, payload: Payload, warnings: Vec<PackageWarning>) -> Self {
        Self {
            package_type: payload.package_type(),
            origin: origin.into(),
            payload,
            warnings,
        }
    }

    pub fn package_type(&self) -> PackageType {
        self.package_type
    }

    /// Path of the archive this package was read from.
    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn warnings(&self) -> &[PackageWarning] {
        &self.warnings
    }

    /// Package-wide version, when the manifest has a parsable one.
    pub fn version(&self) -> Option<&Version> {
        match &self.payload {
            Payload::Os(os) => os.version.as_ref(),
            Payload::MultiOs(_) => None,
        }
    }

    pub fn entries(&self) -> Vec<BlobEntry<'_>> {
        self.payload.entries()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse() {
        let v = Version::parse("1.4.2.20240611").unwrap();
        assert_eq!((v.major, v.minor, v.patch), (1, 4, 2));
        assert_eq!(v.build, "20240611");
        assert_eq!(v.to_string(), "1.4.2.20240611");
    }

    #[test]
    fn test_version_requires_four_components() {
        assert!(matches!(
            Version::parse("1.2.3"),
            Err(ParseError::VersionFormat(_))
        ));
        assert!(matches!(
            Version::parse("1.2.3.4.5"),
            Err(ParseError::VersionFormat(_))
        ));
        assert!(matches!(
            Version::parse("1.2.3."),
            Err(ParseError::VersionFormat(_))
        ));
    }

    #[test]
    fn test_version_component_overflow() {
        assert_eq!(
            Version::parse("256.0.0.b"),
            Err(ParseError::VersionComponent("256".into()))
        );
        assert!(Version::parse("-1.0.0.b").is_err());
        assert!(Version::parse("+1.0.0.b").is_err());
        assert!(Version::parse("255.255.255.b").is_ok());
    }

    #[test]
    fn test_version_build_tag_bound() {
        assert!(Version::parse("1.0.0.0123456789abcdef").is_ok());
        assert_eq!(
            Version::parse("1.0.0.0123456789abcdefg"),
            Err(ParseError::BuildTooLong)
        );
    }

    #[test]
    fn test_checksum_from_hex() {
        let c = Checksum::from_hex("d41d8cd98f00b204e9800998ecf8427e").unwrap();
        assert_eq!(c.0[0], 0xd4);
        assert_eq!(c.0[15], 0x7e);
        assert_eq!(c.to_hex(), "d41d8cd98f00b204e9800998ecf8427e");

        let upper = Checksum::from_hex("D41D8CD98F00B204E9800998ECF8427E").unwrap();
        assert_eq!(upper, c);
    }

    #[test]
    fn test_checksum_rejects_bad_input() {
        assert_eq!(
            Checksum::from_hex("d41d8cd9"),
            Err(ParseError::ChecksumLength(8))
        );
        assert_eq!(
            Checksum::from_hex("z41d8cd98f00b204e9800998ecf8427e"),
            Err(ParseError::ChecksumChar('z'))
        );
        // 32 bytes but not 32 hex digits
        assert!(Checksum::from_hex("d41d8cd98f00b204e9800998ecf842 e").is_err());
    }

    #[test]
    fn test_blob_kind_fallback() {
        assert_eq!(BlobKind::from_name("kernel"), BlobKind::Kernel);
        assert_eq!(BlobKind::from_name("dtb"), BlobKind::Other);
        assert_eq!(BlobKind::from_name("Kernel"), BlobKind::Other);
    }

    #[test]
    fn test_package_type_names() {
        for name in ["os", "patch", "multi-os", "multi-patch"] {
            let t = PackageType::from_name(name).unwrap();
            assert_eq!(t.name(), name);
        }
        assert_eq!(PackageType::from_name("OS"), None);
    }

    #[test]
    fn test_blob_name_validation() {
        assert!(validate_blob_name("kernel.img").is_ok());
        assert!(validate_blob_name("boot/u-boot.bin").is_ok());
        assert_eq!(validate_blob_name(""), Err(ParseError::NameEmpty));
        assert_eq!(
            validate_blob_name(&"a".repeat(128)),
            Err(ParseError::NameTooLong(128))
        );
        assert!(validate_blob_name(&"a".repeat(127)).is_ok());

        for bad in ["/etc/passwd", "../kernel", "a/../b", "./kernel", "a//b", "dir/", "a\0b"] {
            assert!(
                matches!(validate_blob_name(bad), Err(ParseError::NameUnsafe(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_apply_ids_non_empty() {
        assert_eq!(
            ApplyIds::new(Vec::<u32>::new()),
            Err(ParseError::EmptyApplyIds)
        );
        let ids = ApplyIds::new([123, 7, 123]).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(123));
        assert!(!ids.contains(999));
    }

    #[test]
    fn test_install_rank_order() {
        let mut kinds = vec![
            BlobKind::Other,
            BlobKind::Rootfs,
            BlobKind::Kernel,
            BlobKind::Bootloader,
        ];
        kinds.sort_by_key(|k| k.install_rank());
        assert_eq!(
            kinds,
            vec![
                BlobKind::Bootloader,
                BlobKind::Kernel,
                BlobKind::Rootfs,
                BlobKind::Other
            ]
        );
        assert!(BlobKind::Kernel.is_boot_critical());
        assert!(!BlobKind::Rootfs.is_boot_critical());
    }
}
