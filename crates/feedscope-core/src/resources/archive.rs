//! Package archive reading.
//!
//! A package is a zip archive with a `manifest.json` at its root.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use crate::error::ResourceError;
use crate::types::PackageManifest;

/// Manifest entry inside archives and extracted package folders.
pub const MANIFEST_FILE: &str = "manifest.json";

/// File extension of package archives.
pub const PACKAGE_EXTENSION: &str = "nupkg";

pub fn is_package_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(PACKAGE_EXTENSION))
}

/// Read the manifest from archive bytes. `origin` names the archive in errors.
pub fn read_manifest_from_bytes(origin: &str, data: &[u8]) -> Result<PackageManifest, ResourceError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| ResourceError::archive(origin, e))?;
    let mut entry = archive
        .by_name(MANIFEST_FILE)
        .map_err(|e| ResourceError::archive(origin, e))?;

    let mut content = String::new();
    entry
        .read_to_string(&mut content)
        .map_err(|e| ResourceError::invalid_payload(origin, e))?;
    parse_manifest(origin, &content)
}

/// Read the manifest of an archive on disk.
pub fn read_manifest_from_file(path: &Path) -> Result<PackageManifest, ResourceError> {
    let data = std::fs::read(path).map_err(|e| ResourceError::io(path, e))?;
    read_manifest_from_bytes(&path.display().to_string(), &data)
}

/// Read an extracted `manifest.json`.
pub fn read_manifest_json(path: &Path) -> Result<PackageManifest, ResourceError> {
    let content = std::fs::read_to_string(path).map_err(|e| ResourceError::io(path, e))?;
    parse_manifest(&path.display().to_string(), &content)
}

fn parse_manifest(origin: &str, content: &str) -> Result<PackageManifest, ResourceError> {
    serde_json::from_str(content).map_err(|e| ResourceError::invalid_payload(origin, e))
}

/// Build a minimal package archive holding only `manifest`.
pub fn pack_manifest(manifest: &PackageManifest) -> Result<Vec<u8>, ResourceError> {
    let origin = manifest.identity().file_stem();
    let json = serde_json::to_vec_pretty(manifest)
        .map_err(|e| ResourceError::invalid_payload(origin.as_str(), e))?;

    let mut buf = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buf);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        zip.start_file(MANIFEST_FILE, options)
            .map_err(|e| ResourceError::archive(origin.as_str(), e))?;
        zip.write_all(&json)
            .map_err(|e| ResourceError::invalid_payload(origin.as_str(), e))?;
        zip.finish()
            .map_err(|e| ResourceError::archive(origin.as_str(), e))?;
    }
    Ok(buf.into_inner())
}
