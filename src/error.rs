//! Error types for the synchronization pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Terminal failures surfaced by scan, fetch, backup and apply operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HTTP error {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("network request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("downloaded archive is missing or suspiciously small ({size} bytes)")]
    UndersizedArchive { size: u64 },

    #[error("corrupt archive: {0}")]
    CorruptArchive(#[source] zip::result::ZipError),

    #[error("failed extracting {entry}: {source}")]
    ExtractEntry {
        entry: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{context}: {source}")]
    Filesystem {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("copy failed for {src} to {dst}: {source}")]
    Apply {
        src: PathBuf,
        dst: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("another operation is already running")]
    Busy,

    #[error("invalid session state: {0}")]
    State(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Attach filesystem context to an I/O error, keeping the offending path
    /// visible in the message.
    pub fn fs(context: impl Into<String>, source: std::io::Error) -> Self {
        SyncError::Filesystem {
            context: context.into(),
            source,
        }
    }
}

impl From<config::ConfigError> for SyncError {
    fn from(err: config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}
