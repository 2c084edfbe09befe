//! On-disk cache for extracted thumbnails.
//!
//! Keys combine a hash of the source path with the source's modification
//! time, so editing a family file naturally invalidates its cached preview
//! without any bookkeeping. Cache misses are cheap (one metadata call and a
//! file-exists check) and every cache error degrades to a miss.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::Result;

const CACHE_EXT: &str = "png";

pub struct ThumbnailCache {
    root: PathBuf,
}

impl ThumbnailCache {
    /// Cache rooted under the platform cache directory. `None` when the
    /// platform reports no cache location (headless service accounts).
    pub fn new() -> Option<Self> {
        dirs::cache_dir().map(|p| Self::at(p.join("famprobe").join("thumbnails")))
    }

    /// Cache rooted at an explicit directory.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Look up the cached thumbnail for `source`. Returns `None` on any
    /// miss, including a stale entry whose mtime no longer matches.
    pub fn lookup(&self, source: &Path) -> Option<Vec<u8>> {
        let key = cache_key(source, file_mtime(source)?);
        let path = self.root.join(key);
        match fs::read(&path) {
            Ok(bytes) => {
                debug!(source = %source.display(), "thumbnail cache hit");
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// Persist `bytes` as the thumbnail for `source`. Failures are logged
    /// and swallowed; a cache that cannot write is just a cache that
    /// always misses.
    pub fn store(&self, source: &Path, bytes: &[u8]) {
        let Some(mtime) = file_mtime(source) else {
            return;
        };
        let path = self.root.join(cache_key(source, mtime));
        let result = fs::create_dir_all(&self.root).and_then(|()| fs::write(&path, bytes));
        if let Err(e) = result {
            warn!(path = %path.display(), error = %e, "failed to write thumbnail cache entry");
        }
    }

    /// Delete all cache entries, returning how many files were removed.
    pub fn clear(&self) -> Result<u64> {
        if !self.root.exists() {
            return Ok(0);
        }
        let mut removed = 0u64;
        for entry in fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            let is_entry = path
                .extension()
                .map(|e| e == CACHE_EXT)
                .unwrap_or(false);
            if is_entry && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats {
            file_count: 0,
            total_size_bytes: 0,
            cache_path: self.root.to_string_lossy().to_string(),
        };
        if !self.root.exists() {
            return Ok(stats);
        }
        for entry in fs::read_dir(&self.root)?.flatten() {
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    stats.file_count += 1;
                    stats.total_size_bytes += metadata.len();
                }
            }
        }
        Ok(stats)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub file_count: u64,
    pub total_size_bytes: u64,
    pub cache_path: String,
}

fn cache_key(source: &Path, mtime: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    format!("{}_{}.{}", hex::encode(&digest[..8]), mtime, CACHE_EXT)
}

fn file_mtime(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()?
        .modified()
        .ok()?
        .duration_since(SystemTime::UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}
