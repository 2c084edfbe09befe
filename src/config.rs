use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Default cap on how much of a file's prefix the raw scanner examines.
pub const DEFAULT_SCAN_CAP: u64 = 30 * 1024 * 1024;

/// Default read buffer for the sliding-window scan.
pub const DEFAULT_SCAN_BUF: usize = 64 * 1024;

/// Tunable knobs for the extraction pipeline.
///
/// Container producers vary their conventional stream naming across versions,
/// so every stream-name set used for fast lookup is configurable. Values are
/// loadable from a JSON file; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Exact stream names tried first for the preview image, in order.
    pub preview_streams: Vec<String>,
    /// Name substrings accepted when no exact preview stream exists.
    pub preview_substrings: Vec<String>,
    /// Exact stream name of the legacy info blob (UTF-16 text).
    pub info_stream: String,
    /// Exact stream name of the XML part-atom descriptor.
    pub atom_stream: String,
    /// Name substrings accepted for the legacy info blob at root level when
    /// the exact name is absent.
    pub info_substrings: Vec<String>,
    /// Name substrings accepted for the part-atom descriptor at root level
    /// when the exact name is absent.
    pub atom_substrings: Vec<String>,
    /// Cap on raw-scan window, in bytes.
    pub scan_cap_bytes: u64,
    /// Read buffer size for the raw scanner, in bytes.
    pub scan_buffer_bytes: usize,
    /// How long the orchestrator waits for the host bridge.
    pub host_timeout_secs: u64,
    /// Attempts for transient I/O failures (locked files).
    pub io_retry_attempts: u32,
    /// Delay between I/O retries, in milliseconds.
    pub io_retry_delay_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preview_streams: vec!["RevitPreview4.0".to_string()],
            preview_substrings: vec!["Preview".to_string(), "Thumbnail".to_string()],
            info_stream: "BasicFileInfo".to_string(),
            atom_stream: "PartAtom".to_string(),
            info_substrings: vec!["FileInfo".to_string()],
            atom_substrings: vec!["Atom".to_string()],
            scan_cap_bytes: DEFAULT_SCAN_CAP,
            scan_buffer_bytes: DEFAULT_SCAN_BUF,
            host_timeout_secs: 30,
            io_retry_attempts: 3,
            io_retry_delay_ms: 1000,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file, filling unset fields with
    /// defaults via serde.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let cfg: PipelineConfig = serde_json::from_str(&json)
            .map_err(|e| crate::error::ExtractError::Config(e.to_string()))?;
        Ok(cfg)
    }

    pub fn host_timeout(&self) -> Duration {
        Duration::from_secs(self.host_timeout_secs)
    }

    pub fn io_retry_delay(&self) -> Duration {
        Duration::from_millis(self.io_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.scan_cap_bytes, 30 * 1024 * 1024);
        assert_eq!(cfg.preview_streams[0], "RevitPreview4.0");
        assert_eq!(cfg.host_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, r#"{{"scanCapBytes": 1048576, "previewStreams": ["Preview9.9"]}}"#).unwrap();

        let cfg = PipelineConfig::load(f.path()).unwrap();
        assert_eq!(cfg.scan_cap_bytes, 1048576);
        assert_eq!(cfg.preview_streams, vec!["Preview9.9".to_string()]);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.info_stream, "BasicFileInfo");
        assert_eq!(cfg.io_retry_attempts, 3);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not json").unwrap();
        assert!(PipelineConfig::load(f.path()).is_err());
    }
}
