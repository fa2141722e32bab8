//! Manifest reader.
//!
//! Pulls `manifest.json` out of a package archive into a private staging
//! directory, walks its JSON tree and builds a [`Package`]. Either a fully
//! valid package comes back or nothing does; every partially built blob is
//! dropped on the failing path and the staging directory goes with it.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::{info, warn};

use super::types::{
    ApplyIds, Blob, BlobKind, Checksum, MultiBlob, MultiOsPayload, OsPayload, Package,
    PackageType, PackageWarning, Payload, Version,
};
use crate::archive::ArchiveExtractor;
use crate::error::{ExtractError, PackageError};
use crate::staging::StagingDir;

/// Archive member holding the package description.
pub const MANIFEST_NAME: &str = "manifest.json";

/// Read and validate the package at `archive`.
///
/// The manifest is staged under `staging_root` for the duration of the call.
pub fn read(
    extractor: &dyn ArchiveExtractor,
    archive: &Path,
    staging_root: &Path,
) -> Result<Package, PackageError> {
    info!("reading package from {}", archive.display());
    let staging = StagingDir::create(staging_root).map_err(PackageError::Staging)?;

    let manifest = extractor
        .extract(archive, MANIFEST_NAME, staging.path())
        .map_err(|source| PackageError::Unreadable {
            archive: archive.to_path_buf(),
            source,
        })?;

    let bytes = fs::read(&manifest).map_err(|e| PackageError::Unreadable {
        archive: archive.to_path_buf(),
        source: ExtractError::Failed {
            archive: archive.to_path_buf(),
            member: MANIFEST_NAME.to_string(),
            reason: e.to_string(),
        },
    })?;

    let package = parse_manifest(&bytes, archive)?;
    info!(
        "package type {}, {} blob(s)",
        package.package_type(),
        package.entries().len()
    );
    Ok(package)
}

/// Parse manifest JSON into a [`Package`] whose origin is `origin`.
pub fn parse_manifest(bytes: &[u8], origin: &Path) -> Result<Package, PackageError> {
    let root: Value = serde_json::from_slice(bytes)
        .map_err(|e| PackageError::malformed("manifest", e))?;
    let root = root
        .as_object()
        .ok_or_else(|| PackageError::malformed("manifest", "root is not an object"))?;

    let package_type = match root.get("type") {
        Some(Value::String(name)) => PackageType::from_name(name)
            .ok_or_else(|| PackageError::UnknownType(Some(name.clone())))?,
        Some(other) => return Err(PackageError::UnknownType(Some(other.to_string()))),
        None => return Err(PackageError::UnknownType(None)),
    };

    let blobs = root
        .get("blobs")
        .ok_or_else(|| PackageError::malformed("blobs", "missing"))?;

    let mut warnings = Vec::new();
    let payload = match package_type {
        PackageType::Os => Payload::Os(parse_os(root, blobs, &mut warnings)?),
        PackageType::MultiOs => Payload::MultiOs(parse_multi_os(blobs)?),
        PackageType::Patch | PackageType::MultiPatch => {
            return Err(PackageError::Unsupported(package_type));
        }
    };

    Ok(Package::new(origin, payload, warnings))
}

fn parse_os(
    root: &Map<String, Value>,
    blobs: &Value,
    warnings: &mut Vec<PackageWarning>,
) -> Result<OsPayload, PackageError> {
    let apply_ids = parse_apply_ids(root.get("apply id"), "apply id")?;

    // An unusable package version is tolerated; the package simply has none.
    let version = match root.get("version") {
        None => None,
        Some(Value::String(s)) => match Version::parse(s) {
            Ok(v) => {
                info!("package version is {}", v);
                Some(v)
            }
            Err(e) => {
                let warning = PackageWarning::UnparsableVersion {
                    value: s.clone(),
                    reason: e.to_string(),
                };
                warn!("{}", warning);
                warnings.push(warning);
                None
            }
        },
        Some(other) => {
            let warning = PackageWarning::UnparsableVersion {
                value: other.to_string(),
                reason: "not a string".to_string(),
            };
            warn!("{}", warning);
            warnings.push(warning);
            None
        }
    };

    let blobs = blob_array(blobs)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = format!("blobs[{}]", i);
            let obj = blob_object(item, &field)?;
            parse_blob(obj, &field, true, false)
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(OsPayload {
        apply_ids,
        version,
        blobs,
    })
}

fn parse_multi_os(blobs: &Value) -> Result<MultiOsPayload, PackageError> {
    let blobs = blob_array(blobs)?
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = format!("blobs[{}]", i);
            let obj = blob_object(item, &field)?;
            let apply_ids = parse_apply_ids(obj.get("apply id"), &format!("{}.apply id", field))?;
            let blob = parse_blob(obj, &field, false, true)?;
            Ok(MultiBlob { blob, apply_ids })
        })
        .collect::<Result<Vec<_>, PackageError>>()?;

    Ok(MultiOsPayload { blobs })
}

fn blob_array(value: &Value) -> Result<&Vec<Value>, PackageError> {
    let items = value
        .as_array()
        .ok_or_else(|| PackageError::malformed("blobs", "not an array"))?;
    if items.is_empty() {
        return Err(PackageError::malformed("blobs", "no blobs listed"));
    }
    Ok(items)
}

fn blob_object<'a>(item: &'a Value, field: &str) -> Result<&'a Map<String, Value>, PackageError> {
    item.as_object()
        .ok_or_else(|| PackageError::malformed(field, "not an object"))
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<&'a str, PackageError> {
    let path = format!("{}.{}", field, key);
    match obj.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(PackageError::malformed(path, "not a string")),
        None => Err(PackageError::malformed(path, "missing")),
    }
}

fn parse_blob(
    obj: &Map<String, Value>,
    field: &str,
    type_required: bool,
    version_required: bool,
) -> Result<Blob, PackageError> {
    let name = required_str(obj, "name", field)?;

    let checksum = Checksum::from_hex(required_str(obj, "md5sum", field)?)
        .map_err(|e| PackageError::invalid(format!("{}.md5sum", field), e))?;

    let kind = match obj.get("type") {
        Some(Value::String(s)) => BlobKind::from_name(s),
        Some(_) => return Err(PackageError::malformed(format!("{}.type", field), "not a string")),
        None if type_required => {
            return Err(PackageError::malformed(format!("{}.type", field), "missing"))
        }
        None => BlobKind::Other,
    };

    let version = match obj.get("version") {
        None if version_required => {
            return Err(PackageError::malformed(format!("{}.version", field), "missing"))
        }
        None => None,
        Some(Value::String(s)) => Some(
            Version::parse(s).map_err(|e| PackageError::invalid(format!("{}.version", field), e))?,
        ),
        Some(_) => {
            return Err(PackageError::malformed(format!("{}.version", field), "not a string"))
        }
    };

    Blob::new(kind, name, checksum, version)
        .map_err(|e| PackageError::invalid(format!("{}.name", field), e))
}

fn parse_apply_ids(value: Option<&Value>, field: &str) -> Result<ApplyIds, PackageError> {
    let items = value
        .ok_or_else(|| PackageError::malformed(field, "missing"))?
        .as_array()
        .ok_or_else(|| PackageError::malformed(field, "not an array"))?;

    let ids = items
        .iter()
        .enumerate()
        .map(|(i, v)| {
            v.as_u64()
                .and_then(|id| u32::try_from(id).ok())
                .ok_or_else(|| {
                    PackageError::malformed(
                        format!("{}[{}]", field, i),
                        format!("{} is not a device id", v),
                    )
                })
        })
        .collect::<Result<Vec<u32>, _>>()?;

    ApplyIds::new(ids).map_err(|e| PackageError::invalid(field, e))
}
