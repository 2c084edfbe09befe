use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which tier of the cascade produced a thumbnail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceTier {
    /// Exact conventional stream name inside the container.
    FastContainer,
    /// Stream discovered by name-substring scan of the container.
    ContainerScan,
    /// Raw byte-signature scan over the file, container structure ignored.
    RawScan,
    /// Produced by the host application via the bridge.
    Host,
}

/// User-visible outcome of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Succeeded,
    Failed,
    Skipped,
}

/// Partial metadata record recovered from a family file.
///
/// Fields are independently nullable; merging never silently overwrites a
/// value that is already present.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FamilyMetadata {
    pub category: Option<String>,
    pub discipline: Option<String>,
    pub version: Option<String>,
}

impl FamilyMetadata {
    /// Fill only the fields still missing from `self` with values from
    /// `other`. Existing values always win.
    pub fn fill_missing_from(&mut self, other: FamilyMetadata) {
        if self.category.is_none() {
            self.category = other.category;
        }
        if self.discipline.is_none() {
            self.discipline = other.discipline;
        }
        if self.version.is_none() {
            self.version = other.version;
        }
    }
}

/// Outcome of the thumbnail cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailResult {
    /// Validated, self-contained image bytes when a tier succeeded.
    pub bytes: Option<Vec<u8>>,
    pub source_tier: SourceTier,
    pub success: bool,
}

impl ThumbnailResult {
    pub fn found(bytes: Vec<u8>, tier: SourceTier) -> Self {
        Self {
            bytes: Some(bytes),
            source_tier: tier,
            success: true,
        }
    }

    pub fn not_found() -> Self {
        Self {
            bytes: None,
            source_tier: SourceTier::RawScan,
            success: false,
        }
    }
}

/// Host operations the bridge can marshal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    LoadIntoHost,
    ExtractMetadata,
}

/// One unit of host work. Immutable once raised; consumed exactly once.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub operation: Operation,
    pub path: PathBuf,
}

/// What a host session reports back for a completed request.
#[derive(Debug, Clone, Default)]
pub struct HostOutcome {
    pub category: Option<String>,
    pub version: Option<String>,
    /// Path to an image file the host wrote, if it produced one.
    pub thumbnail_path: Option<PathBuf>,
    /// Non-fatal host-side validation warnings that were auto-dismissed
    /// during execution; logged by the bridge, never surfaced as failures.
    pub warnings: Vec<String>,
}

/// Final merged result of `Orchestrator::analyze`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub path: PathBuf,
    pub metadata: FamilyMetadata,
    pub thumbnail: ThumbnailResult,
    /// `"fast-path"` when the host was never touched, `"host-fallback"`
    /// otherwise.
    pub tier: String,
    pub status: ProcessingStatus,
    /// Human-readable summary; raw error detail goes to the log only.
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

impl AnalysisReport {
    pub fn failed(path: PathBuf, message: impl Into<String>) -> Self {
        Self {
            path,
            metadata: FamilyMetadata::default(),
            thumbnail: ThumbnailResult::not_found(),
            tier: "fast-path".to_string(),
            status: ProcessingStatus::Failed,
            message: message.into(),
            processed_at: Utc::now(),
        }
    }
}
