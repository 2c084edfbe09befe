use thiserror::Error;

/// Pipeline-wide error taxonomy.
///
/// Every tier of the extraction cascade converts its own failures into one of
/// these variants; recoverable variants mean "proceed to the next tier",
/// never "abort the analysis".
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file is not a parseable compound container. Not retryable; the
    /// caller should fall back to raw signature scanning.
    #[error("not a valid compound container: {0}")]
    ContainerFormat(String),

    /// A stream with the requested name does not exist in the container.
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// The configuration file exists but does not parse.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The file is locked, truncated mid-read, or otherwise unreadable.
    /// Retryable with backoff; another process may hold the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No known image signature within the scan cap.
    #[error("no image signature found within {scanned} bytes")]
    SignatureNotFound { scanned: u64 },

    /// A request is already raised or executing on this bridge instance.
    #[error("host bridge busy: a request is already in flight")]
    BridgeBusy,

    /// The host did not complete within the caller's timeout. The host-side
    /// work is not cancelled; its eventual result is dropped.
    #[error("host operation timed out after {0:?}")]
    HostTimeout(std::time::Duration),

    /// The host executed the request and reported a failure that could not
    /// be suppressed or rolled back.
    #[error("host execution failed: {0}")]
    HostExecution(String),
}

impl ExtractError {
    /// Transient errors the caller may retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExtractError::Io(_))
    }

    /// Errors that mean "try the next tier", not "give up".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExtractError::ContainerFormat(_)
                | ExtractError::StreamNotFound(_)
                | ExtractError::SignatureNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
