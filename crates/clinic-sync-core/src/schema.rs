//! Collection schema: which collections are tracked and how they are keyed.

use std::collections::BTreeMap;

use crate::document::Document;
use crate::error::CoreError;
use crate::types::DocKey;

/// Key path used by auto-increment collections.
pub const DEFAULT_KEY_PATH: &str = "id";

/// Description of one tracked collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// The document field holding the identifier.
    pub key_path: String,
    /// Whether the store assigns integer ids to documents inserted without one.
    pub auto_increment: bool,
}

impl CollectionSchema {
    /// Read a document's identifier.
    pub fn key_of(&self, doc: &Document) -> Option<DocKey> {
        doc.key(&self.key_path)
    }
}

/// The set of tracked collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    collections: BTreeMap<String, CollectionSchema>,
}

impl Schema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an auto-increment collection keyed by `id`.
    pub fn with_auto(self, name: &str) -> Self {
        self.with_collection(name, DEFAULT_KEY_PATH, true)
    }

    /// Add a collection keyed by an explicit field.
    pub fn with_keyed(self, name: &str, key_path: &str) -> Self {
        self.with_collection(name, key_path, false)
    }

    /// Add a collection.
    pub fn with_collection(mut self, name: &str, key_path: &str, auto_increment: bool) -> Self {
        self.collections.insert(
            name.to_string(),
            CollectionSchema {
                name: name.to_string(),
                key_path: key_path.to_string(),
                auto_increment,
            },
        );
        self
    }

    /// The clinic record schema.
    pub fn clinic() -> Self {
        Self::new()
            .with_keyed("pins", "role")
            .with_keyed("settings", "key")
            .with_auto("patients")
            .with_auto("bookings")
            .with_auto("appointments")
            .with_auto("pharmacyItems")
            .with_auto("stockBatches")
            .with_auto("invoices")
            .with_auto("invoiceItems")
            .with_auto("labInvoices")
            .with_auto("staff")
            .with_auto("attendance")
            .with_auto("referrals")
    }

    /// Look up a collection.
    pub fn get(&self, name: &str) -> Option<&CollectionSchema> {
        self.collections.get(name)
    }

    /// Look up a collection, failing if it is not tracked.
    pub fn require(&self, name: &str) -> Result<&CollectionSchema, CoreError> {
        self.get(name)
            .ok_or_else(|| CoreError::UnknownCollection(name.to_string()))
    }

    /// Whether a collection is tracked.
    pub fn contains(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    /// Collection names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Number of collections.
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    /// Whether no collections are tracked.
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
