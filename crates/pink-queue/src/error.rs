//! Error types for queue storage and monitoring.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading, writing or watching queue files.
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to open or create a file.
    #[error("failed to open {path}: {source}")]
    OpenError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a file.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create a directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to take or release an advisory lock.
    #[error("failed to lock {path}: {source}")]
    LockError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A queue line is not valid JSON for the entry type.
    #[error("corrupt entry at {path}:{line}: {source}")]
    CorruptEntry {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The filesystem watcher could not be set up.
    #[error("watch error on {path}: {message}")]
    WatchError { path: PathBuf, message: String },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
