//! Error types for the device API.

use clinic_sync_core::{CoreError, ValidationError};
use clinic_sync_peer::SyncError;
use clinic_sync_store::StoreError;
use thiserror::Error;

/// Errors that can occur during device operations.
#[derive(Debug, Error)]
pub enum ClinicError {
    /// Validation error.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Schema or document error.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Pairing or session error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for device operations.
pub type Result<T> = std::result::Result<T, ClinicError>;
