//! Catalog Scanner - discovers migration units in a directory

use std::fs;
use std::path::Path;

use crate::definitions::CatalogEntry;
use crate::error::{MigrateError, MigrateResult};
use crate::version;

/// Scan one directory level for migration units.
///
/// Identifiers are file names without their final extension. When `extension`
/// is given only files with that extension are considered. Hidden files,
/// directories and names that yield an empty identifier are ignored.
/// Entries are ordered semver-ascending, followed by named units by name.
pub fn scan(dir: &Path, extension: Option<&str>) -> MigrateResult<Vec<CatalogEntry>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        MigrateError::filesystem(
            format!("Failed to read migrations directory {}", dir.display()),
            e,
        )
    })?;

    let mut versions = Vec::new();
    let mut named = Vec::new();

    for entry in entries {
        let entry = entry.map_err(|e| {
            MigrateError::filesystem(
                format!("Failed to read directory entry in {}", dir.display()),
                e,
            )
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }

        let (stem, ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) => (stem, Some(ext)),
            None => (file_name, None),
        };
        if let Some(wanted) = extension {
            if ext != Some(wanted) {
                continue;
            }
        }

        let id = stem.trim();
        if id.is_empty() {
            continue;
        }

        let catalog_entry = CatalogEntry::new(id, path.clone());
        if version::is_semver(id) {
            versions.push(catalog_entry);
        } else {
            named.push(catalog_entry);
        }
    }

    versions.sort_by(|a, b| {
        version::compare(&a.id, &b.id).unwrap_or(std::cmp::Ordering::Equal)
    });
    named.sort_by(|a, b| a.id.cmp(&b.id));

    tracing::trace!(
        dir = %dir.display(),
        versions = versions.len(),
        named = named.len(),
        "scanned migrations"
    );

    versions.extend(named);
    Ok(versions)
}
