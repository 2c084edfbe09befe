//! Family library listing.
//!
//! Walks a directory tree for family files and pairs each one with its
//! sidecar preview image when the authoring tool exported one next to it
//! (same stem, image extension).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::Result;

const FAMILY_EXT: &str = "rfa";
const SIDECAR_EXTS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyFile {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub modified: Option<DateTime<Utc>>,
    /// Exported preview image sitting next to the family file, if any.
    pub sidecar_thumbnail: Option<PathBuf>,
}

/// Recursively list the family files under `root`, sorted by name.
/// Unreadable entries are skipped rather than failing the whole listing.
pub fn list_families(root: &Path) -> Result<Vec<FamilyFile>> {
    let mut families = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_family = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(FAMILY_EXT))
            .unwrap_or(false);
        if !is_family {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable family file");
                continue;
            }
        };

        families.push(FamilyFile {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default(),
            size_bytes: metadata.len(),
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            sidecar_thumbnail: find_sidecar(path),
            path: path.to_path_buf(),
        });
    }

    families.sort_by(|a, b| a.name.cmp(&b.name));
    debug!(root = %root.display(), count = families.len(), "listed family library");
    Ok(families)
}

fn find_sidecar(family: &Path) -> Option<PathBuf> {
    for ext in SIDECAR_EXTS {
        let candidate = family.with_extension(ext);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path, bytes: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, bytes).unwrap();
    }

    #[test]
    fn lists_families_recursively_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("doors/Single Door.rfa"), b"a");
        touch(&dir.path().join("Window.rfa"), b"bb");
        touch(&dir.path().join("notes.txt"), b"not a family");

        let families = list_families(dir.path()).unwrap();
        let names: Vec<_> = families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["Single Door", "Window"]);
        assert_eq!(families[1].size_bytes, 2);
        assert!(families[0].modified.is_some());
    }

    #[test]
    fn pairs_sidecar_thumbnails_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Chair.rfa"), b"x");
        touch(&dir.path().join("Chair.png"), b"preview");
        touch(&dir.path().join("Table.rfa"), b"x");

        let families = list_families(dir.path()).unwrap();
        assert_eq!(
            families[0].sidecar_thumbnail.as_deref(),
            Some(dir.path().join("Chair.png").as_path())
        );
        assert!(families[1].sidecar_thumbnail.is_none());
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("Legacy.RFA"), b"x");

        let families = list_families(dir.path()).unwrap();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, "Legacy");
    }

    #[test]
    fn empty_or_missing_root_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_families(dir.path()).unwrap().is_empty());
        assert!(list_families(&dir.path().join("nope")).unwrap().is_empty());
    }
}
