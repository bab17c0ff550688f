//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Another handle holds the store's lock file.
    #[error("store locked: {path}")]
    Locked {
        /// Path of the lock file.
        path: String,
    },

    /// The backing path is unusable.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A write was rejected by an injected fault.
    #[error("injected write failure")]
    InjectedFailure,
}
