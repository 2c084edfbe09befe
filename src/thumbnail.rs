//! Preview image extraction cascade.
//!
//! Tier order, cheapest first, each independently failable:
//! 1. exact conventional preview stream name inside the container;
//! 2. name-substring scan over all container streams;
//! 3. raw signature scan over the file bytes, container structure ignored.
//!
//! Candidate bytes are accepted only after image-signature validation, so a
//! misnamed or corrupted stream falls through instead of poisoning the
//! result.

use image::ImageFormat;
use std::path::Path;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::container::CompoundFile;
use crate::error::{ExtractError, Result};
use crate::model::{SourceTier, ThumbnailResult};
use crate::scan::SignatureScanner;

pub struct ThumbnailExtractor {
    cfg: PipelineConfig,
    scanner: SignatureScanner,
}

impl ThumbnailExtractor {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            scanner: SignatureScanner::from_config(cfg),
        }
    }

    /// Walk the tiers until one produces validated image bytes. Exhaustion
    /// of every tier is a `success: false` result, not an error; only
    /// transient I/O failures propagate.
    pub fn extract(&self, path: &Path) -> Result<ThumbnailResult> {
        match self.from_container(path) {
            Ok(Some(result)) => return Ok(result),
            Ok(None) => {}
            Err(e) if e.is_recoverable() => {
                debug!(path = %path.display(), error = %e, "container tiers unavailable");
            }
            Err(e) => return Err(e),
        }

        match self.scanner.scan_file(path) {
            Ok(carved) if is_valid_image(&carved.bytes) => {
                debug!(offset = carved.offset, "thumbnail recovered by raw scan");
                Ok(ThumbnailResult::found(carved.bytes, SourceTier::RawScan))
            }
            Ok(_) => Ok(ThumbnailResult::not_found()),
            Err(e) if e.is_recoverable() => Ok(ThumbnailResult::not_found()),
            Err(e) => Err(e),
        }
    }

    /// Tiers 1 and 2: exact stream name, then substring discovery.
    fn from_container(&self, path: &Path) -> Result<Option<ThumbnailResult>> {
        let mut cf = CompoundFile::open(path)?;

        for name in &self.cfg.preview_streams {
            match cf.stream(name) {
                Ok(bytes) if is_valid_image(&bytes) => {
                    return Ok(Some(ThumbnailResult::found(bytes, SourceTier::FastContainer)));
                }
                Ok(_) => {
                    debug!(stream = %name, "preview stream failed signature validation");
                }
                Err(ExtractError::StreamNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut candidates = Vec::new();
        cf.visit_entries(true, |entry| {
            if entry.is_stream
                && self
                    .cfg
                    .preview_substrings
                    .iter()
                    .any(|s| entry.name.contains(s.as_str()))
            {
                candidates.push(entry.clone());
            }
        });
        for entry in candidates {
            match cf.read_entry(&entry) {
                Ok(bytes) if is_valid_image(&bytes) => {
                    debug!(stream = %entry.name, "preview found by name scan");
                    return Ok(Some(ThumbnailResult::found(bytes, SourceTier::ContainerScan)));
                }
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Accept only bytes whose signature sniffs as a known preview format.
pub fn is_valid_image(bytes: &[u8]) -> bool {
    matches!(
        image::guess_format(bytes),
        Ok(ImageFormat::Png | ImageFormat::Bmp)
    )
}
