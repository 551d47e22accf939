//! Error types for modelhub-dl
//!
//! One error enum covers the whole library. Remote failures are mapped to a
//! small set of kinds (`NotFound`, `Unauthorized`, `RateLimited`, `Network`)
//! so callers can react without inspecting HTTP internals. `Cancelled` is
//! special-cased throughout: it never produces a FAILED terminal status.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for modelhub-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for modelhub-dl
#[derive(Debug, Error)]
pub enum Error {
    /// The given string is not a recognizable model-page URL
    #[error("invalid model URL: {0}")]
    InvalidUrl(String),

    /// The remote service has no model (or version) with the requested id
    #[error("model not found: {0}")]
    NotFound(String),

    /// The remote service rejected the request (missing or invalid API key)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The remote service is throttling us
    #[error("rate limited by remote service: {0}")]
    RateLimited(String),

    /// Transport-level failure (DNS, connect, TLS, read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The filesystem holding the layout tree ran out of space
    #[error("insufficient disk space writing {path}")]
    DiskFull {
        /// Destination that could not be written
        path: PathBuf,
    },

    /// The storage layout is unusable (e.g. no root configured)
    #[error("storage layout error: {0}")]
    Layout(String),

    /// The operation was cancelled cooperatively
    #[error("cancelled")]
    Cancelled,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable description of the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g. "comfy_path")
        key: Option<String>,
    },

    /// Other error
    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Whether this error represents cooperative cancellation.
    ///
    /// Workers use this to decide between the CANCELED and FAILED terminal
    /// states; `Cancelled` must never surface as a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Map an I/O error to `DiskFull` when the OS reports an exhausted
    /// filesystem, otherwise pass it through as `Io`.
    pub(crate) fn from_write_error(err: std::io::Error, path: &std::path::Path) -> Self {
        if err.kind() == std::io::ErrorKind::StorageFull {
            Error::DiskFull {
                path: path.to_path_buf(),
            }
        } else {
            Error::Io(err)
        }
    }
}
