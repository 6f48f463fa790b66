//! Error types for pipemode
//!
//! One error enum for the whole crate. Messages say what failed and, where it
//! helps, what to check next.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// pipemode error types
#[derive(Error, Debug)]
pub enum Error {
    /// Channel stream ended early or could not be opened
    #[error("Data delivery failed on channel '{channel}': {reason}")]
    DataDelivery {
        /// Channel name
        channel: String,
        /// What went wrong
        reason: String,
    },

    /// Record frame failed validation (bad length checksum, bad payload checksum, oversize)
    #[error("Malformed record at byte offset {offset}: {reason}")]
    MalformedRecord {
        /// Byte offset of the frame start within the current pass
        offset: u64,
        /// What went wrong
        reason: String,
    },

    /// Per-record decode function failed
    #[error("Record decode failed: {0}")]
    Decode(String),

    /// Invalid configuration (job, channel, metric definitions, session)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Invalid argument
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Filter expression parse error
    #[error("Filter parse error: {0}")]
    ParseError(String),

    /// Entity already exists
    #[error("Already exists: {0}")]
    Conflict(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Prefetch queue closed before the producer finished
    #[error("Prefetch queue closed (producer thread exited)")]
    QueueClosed,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a delivery failure on a named channel.
    pub fn delivery(channel: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataDelivery {
            channel: channel.into(),
            reason: reason.into(),
        }
    }
}
