//! Encrypted message envelope.
//!
//! Every protocol message crosses the wire as JSON `{nonce, ciphertext}`,
//! where the ciphertext is the JSON-serialized message sealed under the
//! pairing key.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::crypto::{EncryptionNonce, PairingKey};
use crate::error::Result;

/// An encrypted payload envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Nonce used for encryption (unique per encryption).
    pub nonce: EncryptionNonce,

    /// The encrypted data (includes authentication tag).
    pub ciphertext: Vec<u8>,
}

impl Envelope {
    /// Encrypt raw bytes under a fresh random nonce.
    pub fn encrypt(plaintext: &[u8], key: &PairingKey) -> Result<Self> {
        let nonce = EncryptionNonce::generate();
        let ciphertext = key.encrypt(plaintext, &nonce)?;
        Ok(Self { nonce, ciphertext })
    }

    /// Decrypt to raw bytes.
    pub fn decrypt(&self, key: &PairingKey) -> Result<Vec<u8>> {
        key.decrypt(&self.ciphertext, &self.nonce)
    }

    /// Serialize `message` to JSON and encrypt it.
    pub fn seal<T: Serialize>(message: &T, key: &PairingKey) -> Result<Self> {
        let plaintext = serde_json::to_vec(message)?;
        Self::encrypt(&plaintext, key)
    }

    /// Decrypt and parse the JSON message inside.
    pub fn open<T: DeserializeOwned>(&self, key: &PairingKey) -> Result<T> {
        let plaintext = self.decrypt(key)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Serialize to wire bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse wire bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Get the size of the ciphertext.
    pub fn ciphertext_len(&self) -> usize {
        self.ciphertext.len()
    }
}
