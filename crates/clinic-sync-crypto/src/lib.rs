//! # Clinic Sync Crypto
//!
//! The crypto channel between paired devices.
//!
//! ## Overview
//!
//! Two devices are paired by a human-shared secret (a "pair code"). Each side
//! derives the same 256-bit [`PairingKey`] from it with PBKDF2-HMAC-SHA256,
//! and every protocol message is sealed into an [`Envelope`] with
//! ChaCha20-Poly1305 under a fresh random nonce.
//!
//! ## Key Types
//!
//! - [`PairingKey`] - Symmetric key derived from the pairing secret
//! - [`EncryptionNonce`] - 96-bit per-message nonce
//! - [`Envelope`] - The `{nonce, ciphertext}` wire envelope
//!
//! ## Usage
//!
//! ```rust
//! use clinic_sync_crypto::{Envelope, PairingKey};
//!
//! let key = PairingKey::derive_with_iterations("1234", 1_000).unwrap();
//! let envelope = Envelope::seal(&serde_json::json!({"type": "noop"}), &key).unwrap();
//! let message: serde_json::Value = envelope.open(&key).unwrap();
//! assert_eq!(message["type"], "noop");
//! ```

pub mod crypto;
pub mod envelope;
pub mod error;

pub use crypto::{EncryptionNonce, PairingKey, DEFAULT_KDF_ITERATIONS, PAIRING_SALT};
pub use envelope::Envelope;
pub use error::{CryptoError, Result};
