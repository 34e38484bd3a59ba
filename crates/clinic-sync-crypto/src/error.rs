//! Error types for the crypto channel.

use thiserror::Error;

/// Errors raised while deriving keys or sealing/opening envelopes.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The pairing secret is empty after trimming.
    #[error("pairing secret is empty")]
    EmptySecret,

    /// Key derivation parameters are unusable.
    #[error("key derivation error: {0}")]
    KeyDerivation(String),

    /// Encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The authentication tag did not verify: wrong key or tampered data.
    #[error("authentication failed")]
    Authentication,

    /// Plaintext or envelope (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CryptoError {
    fn from(e: serde_json::Error) -> Self {
        CryptoError::Serialization(e.to_string())
    }
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
