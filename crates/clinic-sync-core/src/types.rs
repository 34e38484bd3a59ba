//! Strong type definitions for Clinic Sync.
//!
//! Identifiers and clocks are newtypes to prevent mixing a device-local
//! log position with a document key or a version stamp.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Milliseconds since the Unix epoch, as read from a device clock.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// The zero timestamp. Watermarks start here.
    pub const ZERO: Self = Self(0);

    /// Create from milliseconds.
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Get the raw milliseconds.
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Self(ms)
    }
}

/// A 16-byte device identifier.
///
/// Generated once per store and persisted with it. Serialized as a hex string.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub [u8; 16]);

impl DeviceId {
    /// The zero device ID (sentinel).
    pub const ZERO: Self = Self([0u8; 16]);

    /// Generate a random device ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

impl Serialize for DeviceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        DeviceId::from_hex(&s).map_err(de::Error::custom)
    }
}

/// The last-writer-wins stamp of a single write.
///
/// Ordered by `ts`, then by `device`, so two devices writing in the same
/// millisecond still agree on a winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    /// When the write happened on its originating device.
    pub ts: Timestamp,
    /// The device that made the write.
    pub device: DeviceId,
}

impl Version {
    /// Create a new version stamp.
    pub const fn new(ts: Timestamp, device: DeviceId) -> Self {
        Self { ts, device }
    }
}

/// A document identifier.
///
/// Most clinic collections use auto-increment integers; a few (settings,
/// pins) are keyed by strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocKey {
    Int(i64),
    Text(String),
}

impl DocKey {
    /// Read a key out of a JSON value. Only integers and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(DocKey::Int),
            Value::String(s) => Some(DocKey::Text(s.clone())),
            _ => None,
        }
    }

    /// Convert to a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            DocKey::Int(n) => Value::from(*n),
            DocKey::Text(s) => Value::from(s.clone()),
        }
    }

    /// Encode as compact JSON, used as the storage key.
    pub fn encode(&self) -> String {
        match self {
            DocKey::Int(n) => n.to_string(),
            DocKey::Text(s) => Value::from(s.as_str()).to_string(),
        }
    }

    /// Decode from the storage encoding produced by [`DocKey::encode`].
    pub fn decode(s: &str) -> Option<Self> {
        serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| Self::from_value(&v))
    }

    /// The integer value, if this is an integer key.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            DocKey::Int(n) => Some(*n),
            DocKey::Text(_) => None,
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocKey::Int(n) => write!(f, "{}", n),
            DocKey::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for DocKey {
    fn from(n: i64) -> Self {
        DocKey::Int(n)
    }
}

impl From<&str> for DocKey {
    fn from(s: &str) -> Self {
        DocKey::Text(s.to_string())
    }
}

impl From<String> for DocKey {
    fn from(s: String) -> Self {
        DocKey::Text(s)
    }
}
