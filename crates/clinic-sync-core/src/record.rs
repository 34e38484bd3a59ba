//! ChangeRecord: one logged mutation.
//!
//! Records are created by store hooks, read by the sync engine, and never
//! updated or deleted.

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::types::{DeviceId, DocKey, Timestamp, Version};

/// The kind of mutation a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Create or replace a document.
    Put,
    /// Remove a document.
    Delete,
}

impl Operation {
    /// Storage encoding.
    pub const fn to_u8(self) -> u8 {
        match self {
            Operation::Put => 0,
            Operation::Delete => 1,
        }
    }

    /// Parse from storage encoding.
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Operation::Put),
            1 => Some(Operation::Delete),
            _ => None,
        }
    }
}

/// One mutation in a device's change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Position in the local log (device clock, strictly increasing).
    pub timestamp: Timestamp,
    /// The collection that was mutated.
    pub collection: String,
    /// What happened.
    pub operation: Operation,
    /// The document key, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<DocKey>,
    /// The post-mutation document (absent for deletes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Document>,
    /// Last-writer-wins stamp of the write. Preserved across replays.
    pub version: Version,
}

impl ChangeRecord {
    /// A put record.
    pub fn put(
        timestamp: Timestamp,
        collection: impl Into<String>,
        key: Option<DocKey>,
        value: Document,
        version: Version,
    ) -> Self {
        Self {
            timestamp,
            collection: collection.into(),
            operation: Operation::Put,
            key,
            value: Some(value),
            version,
        }
    }

    /// A delete record carrying only the key.
    pub fn delete(
        timestamp: Timestamp,
        collection: impl Into<String>,
        key: DocKey,
        version: Version,
    ) -> Self {
        Self {
            timestamp,
            collection: collection.into(),
            operation: Operation::Delete,
            key: Some(key),
            value: None,
            version,
        }
    }

    /// A locally originated put, stamped with `device`.
    pub fn local_put(
        timestamp: Timestamp,
        collection: impl Into<String>,
        key: DocKey,
        value: Document,
        device: DeviceId,
    ) -> Self {
        Self::put(
            timestamp,
            collection,
            Some(key),
            value,
            Version::new(timestamp, device),
        )
    }

    /// A locally originated delete, stamped with `device`.
    pub fn local_delete(
        timestamp: Timestamp,
        collection: impl Into<String>,
        key: DocKey,
        device: DeviceId,
    ) -> Self {
        Self::delete(timestamp, collection, key, Version::new(timestamp, device))
    }

    /// The device that authored the write.
    pub fn origin(&self) -> DeviceId {
        self.version.device
    }

    /// Copy of this record at a new local log position. The version is kept.
    pub fn restamped(&self, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            ..self.clone()
        }
    }

    /// Whether this is a put.
    pub fn is_put(&self) -> bool {
        self.operation == Operation::Put
    }

    /// Whether this is a delete.
    pub fn is_delete(&self) -> bool {
        self.operation == Operation::Delete
    }
}
