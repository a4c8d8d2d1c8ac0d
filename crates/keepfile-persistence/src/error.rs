//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing or deleting a stored value.
///
/// Reads never produce these to callers; corruption is handled by rollback
/// and total loss resolves to the fallback value.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read from file system.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write or rename a file.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to remove a file or directory.
    #[error("failed to remove {path}: {source}")]
    RemoveError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to encode a value.
    #[error("failed to encode value: {0}")]
    EncodeError(String),

    /// Failed to decode a payload.
    #[error("failed to decode payload: {0}")]
    DecodeError(String),

    /// On-disk state that cannot be used as-is.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A blocking worker panicked or was cancelled.
    #[error("storage task failed: {0}")]
    TaskError(String),
}

impl From<tokio::task::JoinError> for PersistenceError {
    fn from(err: tokio::task::JoinError) -> Self {
        PersistenceError::TaskError(err.to_string())
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
