//! Waterfall orchestration of an analysis call.
//!
//! The two fast-path extractions are independent read-only operations and
//! run concurrently on blocking worker tasks; transient I/O failures are
//! retried with backoff (another process may briefly hold the file). Only
//! when the fast path leaves the category or the preview unresolved does the
//! orchestrator raise a request on the host bridge, bounded by a timeout.
//! Host results only ever fill fields the fast path left empty.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::bridge::HostBridge;
use crate::config::PipelineConfig;
use crate::error::{ExtractError, Result};
use crate::metadata::{map_category_to_discipline, MetadataExtractor};
use crate::model::{
    AnalysisReport, FamilyMetadata, HostOutcome, Operation, ProcessingStatus, SourceTier,
    ThumbnailResult,
};
use crate::thumbnail::{is_valid_image, ThumbnailExtractor};

pub struct Orchestrator {
    cfg: PipelineConfig,
    metadata: Arc<MetadataExtractor>,
    thumbnails: Arc<ThumbnailExtractor>,
    bridge: Option<HostBridge>,
}

impl Orchestrator {
    /// Fast-path only; incomplete results are returned as-is.
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            metadata: Arc::new(MetadataExtractor::new(&cfg)),
            thumbnails: Arc::new(ThumbnailExtractor::new(&cfg)),
            bridge: None,
            cfg,
        }
    }

    /// Escalate unresolved analyses to the given host bridge.
    pub fn with_bridge(cfg: PipelineConfig, bridge: HostBridge) -> Self {
        let mut this = Self::new(cfg);
        this.bridge = Some(bridge);
        this
    }

    /// Analyze one family file. Never panics and never returns an error:
    /// every failure mode collapses into a `Failed` report with a
    /// human-readable message (raw detail goes to the log). Re-running on an
    /// unchanged file reproduces the same merged result.
    pub async fn analyze(&self, path: &Path) -> AnalysisReport {
        match tokio::fs::metadata(path).await {
            Ok(m) if m.len() > 0 => {}
            Ok(_) => return AnalysisReport::failed(path.to_path_buf(), "file is empty"),
            Err(_) => return AnalysisReport::failed(path.to_path_buf(), "file does not exist"),
        }

        let meta_fut = self.retrying({
            let extractor = self.metadata.clone();
            let path = path.to_path_buf();
            move || extractor.extract(&path)
        });
        let thumb_fut = self.retrying({
            let extractor = self.thumbnails.clone();
            let path = path.to_path_buf();
            move || extractor.extract(&path)
        });
        let (meta_res, thumb_res) = tokio::join!(meta_fut, thumb_fut);

        let metadata = meta_res.unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "metadata fast path failed");
            FamilyMetadata::default()
        });
        let thumbnail = thumb_res.unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "thumbnail fast path failed");
            ThumbnailResult::not_found()
        });

        if metadata.category.is_some() && thumbnail.success {
            info!(path = %path.display(), "analysis resolved on the fast path");
            return finish(path, metadata, thumbnail, "fast-path", ProcessingStatus::Succeeded,
                "analysis complete");
        }

        match &self.bridge {
            Some(bridge) => self.host_fallback(bridge, path, metadata, thumbnail).await,
            None => {
                let got_anything = metadata.category.is_some()
                    || metadata.version.is_some()
                    || thumbnail.success;
                let (status, message) = if got_anything {
                    (ProcessingStatus::Succeeded, "partial analysis, no host configured")
                } else {
                    (ProcessingStatus::Failed, "nothing recovered and no host configured")
                };
                finish(path, metadata, thumbnail, "fast-path", status, message)
            }
        }
    }

    async fn host_fallback(
        &self,
        bridge: &HostBridge,
        path: &Path,
        mut metadata: FamilyMetadata,
        mut thumbnail: ThumbnailResult,
    ) -> AnalysisReport {
        let receiver = match bridge.raise(Operation::ExtractMetadata, path) {
            Ok(rx) => rx,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot raise host request");
                return finish(path, metadata, thumbnail, "host-fallback",
                    ProcessingStatus::Failed, "host bridge busy with another request");
            }
        };

        let outcome = match timeout(self.cfg.host_timeout(), receiver).await {
            Ok(Ok(Ok(outcome))) => outcome,
            Ok(Ok(Err(e))) => {
                warn!(path = %path.display(), error = %e, "host reported failure");
                return finish(path, metadata, thumbnail, "host-fallback",
                    ProcessingStatus::Failed, "host could not analyze the file");
            }
            Ok(Err(_closed)) => {
                warn!(path = %path.display(), "host bridge dropped the request");
                return finish(path, metadata, thumbnail, "host-fallback",
                    ProcessingStatus::Failed, "host bridge closed before completing");
            }
            Err(_elapsed) => {
                let err = ExtractError::HostTimeout(self.cfg.host_timeout());
                // The host thread keeps running; its eventual completion
                // will be dropped on the floor, so say so in the log.
                warn!(
                    path = %path.display(),
                    error = %err,
                    "host operation timed out; not cancelled, result will be dropped"
                );
                return finish(path, metadata, thumbnail, "host-fallback",
                    ProcessingStatus::Failed, err.to_string());
            }
        };

        merge_host_outcome(&mut metadata, &mut thumbnail, outcome);
        info!(path = %path.display(), "analysis resolved via host fallback");
        finish(path, metadata, thumbnail, "host-fallback", ProcessingStatus::Succeeded,
            "analysis complete")
    }

    /// Run a blocking extraction on a worker task, retrying transient I/O
    /// failures with a fixed delay.
    async fn retrying<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn() -> Result<T> + Clone + Send + 'static,
    {
        let attempts = self.cfg.io_retry_attempts.max(1);
        let delay = self.cfg.io_retry_delay();
        let mut attempt = 1;
        loop {
            let op = op.clone();
            let result = tokio::task::spawn_blocking(op)
                .await
                .map_err(|e| ExtractError::HostExecution(format!("worker task failed: {e}")))?;
            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(error = %e, attempt, "transient I/O failure, backing off");
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Fill only what the fast path left unresolved; fast-path values are never
/// overwritten by host results.
fn merge_host_outcome(
    metadata: &mut FamilyMetadata,
    thumbnail: &mut ThumbnailResult,
    outcome: HostOutcome,
) {
    metadata.fill_missing_from(FamilyMetadata {
        discipline: outcome
            .category
            .as_deref()
            .map(map_category_to_discipline)
            .map(str::to_string),
        category: outcome.category,
        version: outcome.version,
    });

    if !thumbnail.success {
        if let Some(thumb_path) = outcome.thumbnail_path {
            match std::fs::read(&thumb_path) {
                Ok(bytes) if is_valid_image(&bytes) => {
                    *thumbnail = ThumbnailResult::found(bytes, SourceTier::Host);
                }
                Ok(_) => warn!(path = %thumb_path.display(), "host thumbnail failed validation"),
                Err(e) => warn!(path = %thumb_path.display(), error = %e, "cannot read host thumbnail"),
            }
        }
    }
}

fn finish(
    path: &Path,
    metadata: FamilyMetadata,
    thumbnail: ThumbnailResult,
    tier: &str,
    status: ProcessingStatus,
    message: impl Into<String>,
) -> AnalysisReport {
    AnalysisReport {
        path: PathBuf::from(path),
        metadata,
        thumbnail,
        tier: tier.to_string(),
        status,
        message: message.into(),
        processed_at: Utc::now(),
    }
}
