//! Store traits: the narrow interfaces the sync engine depends on, plus the
//! local mutation API the application uses.
//!
//! The engine only needs [`ChangeLog`] (read side) and [`ReplaySink`] (write
//! side). [`Store`] adds the tracked local mutations whose hooks feed the log.

use async_trait::async_trait;
use clinic_sync_core::{ChangeRecord, DeviceId, DocKey, Document, Schema, Timestamp, Version};

use crate::error::Result;

/// Result of replaying a foreign mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The mutation was applied and logged locally.
    Applied,
    /// The stored version is newer or equal; nothing changed.
    Stale,
    /// A delete for a document that does not exist. The tombstone is kept,
    /// nothing is logged.
    Absent,
}

impl ApplyOutcome {
    /// Whether the local state changed.
    pub fn is_applied(self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }
}

/// The change log: append-only record of every tracked mutation.
#[async_trait]
pub trait ChangeLog: Send + Sync {
    /// The device that authors local log entries.
    fn device_id(&self) -> DeviceId;

    /// Append a record as-is. Only its shape is validated.
    async fn append(&self, record: &ChangeRecord) -> Result<()>;

    /// All records with `timestamp > since`, ascending, ties in insertion order.
    async fn changes_since(&self, since: Timestamp) -> Result<Vec<ChangeRecord>>;

    /// Newest log timestamp, or zero when the log is empty.
    async fn latest_timestamp(&self) -> Result<Timestamp>;
}

/// Apply side used when replaying foreign mutations.
///
/// Both operations are idempotent: replaying the same write twice yields
/// [`ApplyOutcome::Stale`] the second time.
#[async_trait]
pub trait ReplaySink: Send + Sync {
    /// The tracked collections.
    fn schema(&self) -> &Schema;

    /// Upsert a document if `version` beats the stored version.
    ///
    /// The identifier is read from the document, falling back to `key`.
    async fn replay_put(
        &self,
        collection: &str,
        key: Option<&DocKey>,
        document: &Document,
        version: Version,
    ) -> Result<ApplyOutcome>;

    /// Remove a document if `version` beats the stored version.
    async fn replay_delete(
        &self,
        collection: &str,
        key: &DocKey,
        version: Version,
    ) -> Result<ApplyOutcome>;
}

/// A document store whose every mutation is captured in its change log.
#[async_trait]
pub trait Store: ChangeLog + ReplaySink {
    // ─────────────────────────────────────────────────────────────────────────
    // Tracked Mutations
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a new document, assigning an id in auto-increment collections.
    async fn insert(&self, collection: &str, document: Document) -> Result<DocKey>;

    /// Shallow-merge `patch` into an existing document. Returns the merged
    /// document.
    async fn update(&self, collection: &str, key: &DocKey, patch: Document) -> Result<Document>;

    /// Create or replace a document.
    async fn put(&self, collection: &str, document: Document) -> Result<DocKey>;

    /// Delete a document. Returns whether it existed; deleting a missing
    /// document logs nothing.
    async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a live document.
    async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Document>>;

    /// All live documents in a collection, ordered by key.
    async fn list(&self, collection: &str) -> Result<Vec<Document>>;

    /// The stored version of a document, live or tombstoned.
    async fn version_of(&self, collection: &str, key: &DocKey) -> Result<Option<Version>>;
}
