//! Golden test vectors for pairing-key derivation.
//!
//! Every device must derive the same key from the same secret, or pairing
//! silently fails (all messages are dropped as unauthenticated). These
//! vectors pin PBKDF2-HMAC-SHA256 with the application salt.

use clinic_sync_crypto::{PairingKey, DEFAULT_KDF_ITERATIONS, PAIRING_SALT};

/// A golden key-derivation vector.
#[derive(Debug, Clone)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    /// The secret as typed.
    pub secret: &'static str,
    /// PBKDF2 iterations.
    pub iterations: u32,
    /// Expected key (hex).
    pub expected_key: &'static str,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    vec![
        GoldenVector {
            name: "four digit pin",
            secret: "1234",
            iterations: DEFAULT_KDF_ITERATIONS,
            expected_key: "acd14a2d1feeaf31581dbddaf9fb22d16ff1cdfb376216588e11fb38ff6aa2b9",
        },
        GoldenVector {
            name: "surrounding whitespace is ignored",
            secret: "  1234  ",
            iterations: DEFAULT_KDF_ITERATIONS,
            expected_key: "acd14a2d1feeaf31581dbddaf9fb22d16ff1cdfb376216588e11fb38ff6aa2b9",
        },
        GoldenVector {
            name: "pairing code",
            secret: "clinic-pair-code",
            iterations: DEFAULT_KDF_ITERATIONS,
            expected_key: "a9d45395a6e2e26df8c0d01228d0c45728600fae88eecd21a2451e5463aa051d",
        },
        GoldenVector {
            name: "passphrase with spaces",
            secret: "correct horse battery staple",
            iterations: DEFAULT_KDF_ITERATIONS,
            expected_key: "0cf8e3f78c4bd5703fc77ee47300c0faca05a3e94960a293b9731130374a8162",
        },
        GoldenVector {
            name: "reduced iterations",
            secret: "1234",
            iterations: 1_000,
            expected_key: "97b40fc6e8da9b48ddbad340564e3ca8db7392636a7d08ce2a149db4f5cbbd98",
        },
    ]
}

/// Derive the key a vector describes.
pub fn derive_from_vector(vector: &GoldenVector) -> PairingKey {
    PairingKey::derive_with_iterations(vector.secret, vector.iterations)
        .expect("golden vectors have valid secrets")
}

/// Verify all vectors. Returns the names of mismatching vectors.
pub fn verify_all_vectors() -> Vec<&'static str> {
    all_vectors()
        .iter()
        .filter(|v| hex::encode(derive_from_vector(v).as_bytes()) != v.expected_key)
        .map(|v| v.name)
        .collect()
}

/// The salt the vectors were generated with.
pub fn vector_salt() -> &'static [u8] {
    PAIRING_SALT
}
