//! Error types for the store module.

use keri_kernel_core::{CoreError, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored body could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A stored log no longer replays.
    #[error("stored log {log} does not replay: {source}")]
    Replay {
        log: String,
        #[source]
        source: ValidationError,
    },

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// The blocking task running a query failed.
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<CoreError> for StoreError {
    fn from(e: CoreError) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
