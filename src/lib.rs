//! famprobe — tiered metadata and thumbnail extraction for CAD family files.
//!
//! Family files (`.rfa`) are OLE compound documents. This crate reads them
//! directly: a compound-container reader locates well-known streams, a
//! signature scanner carves embedded PNG/BMP previews out of raw bytes, and
//! decoders recover category, discipline and version text. The orchestrator
//! runs those tiers in order from cheapest to most expensive and, when
//! configured with a host bridge, escalates unresolved files to an external
//! authoring host as the last tier.

pub mod bridge;
pub mod cache;
pub mod config;
pub mod container;
pub mod error;
pub mod library;
pub mod metadata;
pub mod model;
pub mod orchestrator;
pub mod scan;
pub mod thumbnail;

pub use bridge::{BridgeState, HostBridge, HostFailure, HostSession};
pub use cache::{CacheStats, ThumbnailCache};
pub use config::PipelineConfig;
pub use container::{CompoundFile, ContainerEntry};
pub use error::{ExtractError, Result};
pub use library::{list_families, FamilyFile};
pub use metadata::MetadataExtractor;
pub use model::{
    AnalysisReport, ExtractionRequest, FamilyMetadata, HostOutcome, Operation, ProcessingStatus,
    SourceTier, ThumbnailResult,
};
pub use orchestrator::Orchestrator;
pub use scan::{CarvedImage, ImageKind, SignatureScanner};
pub use thumbnail::ThumbnailExtractor;

use tracing_subscriber::EnvFilter;

/// Initialize tracing with the RUST_LOG env filter.
/// Default: warn for dependencies, info for this crate.
/// Use RUST_LOG=debug for verbose per-stream logs.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,famprobe=info")),
        )
        .init();
}
