//! Error types for the store module.

use clinic_sync_core::{CoreError, DocKey, ValidationError};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema or document error (unknown collection, missing key).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A change record failed shape validation.
    #[error("invalid change record: {0}")]
    Validation(#[from] ValidationError),

    /// Document serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The document does not exist.
    #[error("{collection}/{key} not found")]
    NotFound { collection: String, key: DocKey },

    /// A document with this key already exists.
    #[error("{collection}/{key} already exists")]
    AlreadyExists { collection: String, key: DocKey },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
