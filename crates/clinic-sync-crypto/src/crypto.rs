//! Pairing key derivation and ChaCha20-Poly1305 authenticated encryption.

use std::fmt;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{CryptoError, Result};

/// Application salt for pairing-key derivation.
pub const PAIRING_SALT: &[u8] = b"clinic-sync-pairing-v1";

/// PBKDF2 iteration count.
pub const DEFAULT_KDF_ITERATIONS: u32 = 120_000;

/// A 256-bit symmetric key derived from the shared pairing secret.
///
/// Two devices that enter the same secret derive the same key. The key
/// bytes never appear in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct PairingKey([u8; 32]);

impl PairingKey {
    /// Derive a key from a pairing secret with the default iteration count.
    ///
    /// Surrounding whitespace is ignored. This is CPU-heavy; async callers
    /// should run it on the blocking pool.
    pub fn derive(secret: &str) -> Result<Self> {
        Self::derive_with_iterations(secret, DEFAULT_KDF_ITERATIONS)
    }

    /// Derive a key with an explicit PBKDF2-HMAC-SHA256 iteration count.
    pub fn derive_with_iterations(secret: &str, iterations: u32) -> Result<Self> {
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(CryptoError::EmptySecret);
        }
        if iterations == 0 {
            return Err(CryptoError::KeyDerivation(
                "iteration count must be positive".into(),
            ));
        }

        let mut key = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), PAIRING_SALT, iterations, &mut key);
        Ok(Self(key))
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Generate a random key. Useful for tests.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Short hex fingerprint, safe to show to users for comparing pairings.
    pub fn fingerprint(&self) -> String {
        hex::encode(&blake3::hash(&self.0).as_bytes()[..4])
    }

    /// Encrypt data with this key.
    pub fn encrypt(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// Decrypt data with this key. Any tag failure is an authentication error.
    pub fn decrypt(&self, ciphertext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CryptoError::Encryption(e.to_string()))?;

        let nonce = Nonce::from_slice(&nonce.0);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Authentication)
    }
}

impl fmt::Debug for PairingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairingKey({})", self.fingerprint())
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptionNonce(pub [u8; 12]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 12] {
        &self.0
    }
}
