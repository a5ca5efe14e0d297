//! Error types for the store module.

use evidence_ledger_core::{CanonicalError, JsonlError, Rhid};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// The ledger ends in a partial line. Treated as insufficient data.
    #[error("ledger is truncated after {complete_lines} complete lines")]
    Truncated { complete_lines: usize },

    /// Objects are write-once: different bytes already exist under this RHID.
    #[error("object {0} already exists with different content")]
    ObjectExists(Rhid),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the backend was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking task could not be joined.
    #[error("blocking task failed: {0}")]
    Join(String),
}

impl From<JsonlError> for StoreError {
    fn from(err: JsonlError) -> Self {
        match err {
            JsonlError::Truncated { complete_lines } => StoreError::Truncated { complete_lines },
            JsonlError::Line { .. } => StoreError::Serialization(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
