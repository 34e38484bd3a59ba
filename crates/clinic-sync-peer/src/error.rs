//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
///
/// Only setup errors (and transport errors during negotiation) are returned
/// to callers. Everything that happens inside a running session is logged
/// and dropped.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Bad pairing input or engine in the wrong state.
    #[error("setup error: {0}")]
    Setup(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Key derivation, sealing or opening failed.
    #[error("crypto error: {0}")]
    Crypto(#[from] clinic_sync_crypto::CryptoError),

    /// Malformed or oversized message.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] clinic_sync_store::StoreError),
}

impl From<std::io::Error> for SyncError {
    fn from(e: std::io::Error) -> Self {
        SyncError::Transport(e.to_string())
    }
}

/// Per-record replay failures. Never fatal to the session.
#[derive(Debug, Error)]
pub enum ReplayError {
    /// The record names a collection this device does not track.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// Neither the record nor its document carries an identifier.
    #[error("no key for record in {collection}")]
    MissingKey { collection: String },

    /// The record failed shape validation.
    #[error("malformed record: {0}")]
    Malformed(#[from] clinic_sync_core::ValidationError),

    /// The store rejected the write.
    #[error("store error: {0}")]
    Store(clinic_sync_store::StoreError),
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
