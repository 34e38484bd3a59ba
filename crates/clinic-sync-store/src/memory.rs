//! In-memory implementation of the store traits.
//!
//! Same semantics as SQLite but nothing is persisted. A document write and
//! its log entry happen under one write lock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use clinic_sync_core::{
    validate_record, ChangeRecord, Clock, CoreError, DeviceId, DocKey, Document, LogClock,
    Schema, SystemClock, Timestamp, Version,
};

use crate::error::{Result, StoreError};
use crate::traits::{ApplyOutcome, ChangeLog, ReplaySink, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    schema: Schema,
    device: DeviceId,
    clock: LogClock,
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Documents and tombstones per collection.
    collections: HashMap<String, BTreeMap<DocKey, Entry>>,

    /// The change log in insertion order.
    log: Vec<ChangeRecord>,

    /// Highest integer id handed out or seen per collection.
    sequences: HashMap<String, i64>,
}

/// A live document or a tombstone (`doc == None`), with its version.
#[derive(Clone)]
struct Entry {
    doc: Option<Document>,
    version: Version,
}

impl MemoryStoreInner {
    fn entry(&self, collection: &str, key: &DocKey) -> Option<&Entry> {
        self.collections.get(collection).and_then(|c| c.get(key))
    }

    fn live(&self, collection: &str, key: &DocKey) -> Option<&Document> {
        self.entry(collection, key).and_then(|e| e.doc.as_ref())
    }

    fn write(&mut self, collection: &str, key: DocKey, doc: Option<Document>, version: Version) {
        if let Some(id) = key.as_int() {
            let seq = self.sequences.entry(collection.to_string()).or_insert(0);
            *seq = (*seq).max(id);
        }
        self.collections
            .entry(collection.to_string())
            .or_default()
            .insert(key, Entry { doc, version });
    }

    fn next_id(&mut self, collection: &str) -> DocKey {
        let seq = self.sequences.entry(collection.to_string()).or_insert(0);
        *seq += 1;
        DocKey::Int(*seq)
    }
}

impl MemoryStore {
    /// Create an empty store with a random device id and the system clock.
    pub fn new(schema: Schema) -> Self {
        Self::with_clock(schema, DeviceId::random(), Arc::new(SystemClock))
    }

    /// Create an empty store with an explicit device id and clock.
    pub fn with_clock(schema: Schema, device: DeviceId, clock: Arc<dyn Clock>) -> Self {
        Self {
            schema,
            device,
            clock: LogClock::new(clock),
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    /// Write a local document and log it. Caller holds the lock.
    fn put_locked(
        &self,
        inner: &mut MemoryStoreInner,
        collection: &str,
        key: DocKey,
        doc: Document,
    ) -> DocKey {
        let ts = self.clock.next();
        let version = Version::new(ts, self.device);
        inner.log.push(ChangeRecord::put(
            ts,
            collection,
            Some(key.clone()),
            doc.clone(),
            version,
        ));
        inner.write(collection, key.clone(), Some(doc), version);
        key
    }
}

#[async_trait]
impl ChangeLog for MemoryStore {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    async fn append(&self, record: &ChangeRecord) -> Result<()> {
        validate_record(record)?;
        let mut inner = self.write()?;
        self.clock.observe(record.timestamp);
        inner.log.push(record.clone());
        Ok(())
    }

    async fn changes_since(&self, since: Timestamp) -> Result<Vec<ChangeRecord>> {
        let inner = self.read()?;
        let mut records: Vec<ChangeRecord> = inner
            .log
            .iter()
            .filter(|r| r.timestamp > since)
            .cloned()
            .collect();
        // Stable sort keeps insertion order on ties.
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }

    async fn latest_timestamp(&self) -> Result<Timestamp> {
        let inner = self.read()?;
        Ok(inner
            .log
            .iter()
            .map(|r| r.timestamp)
            .max()
            .unwrap_or(Timestamp::ZERO))
    }
}

#[async_trait]
impl ReplaySink for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn replay_put(
        &self,
        collection: &str,
        key: Option<&DocKey>,
        document: &Document,
        version: Version,
    ) -> Result<ApplyOutcome> {
        let spec = self.schema.require(collection)?;
        let key = spec
            .key_of(document)
            .or_else(|| key.cloned())
            .ok_or_else(|| CoreError::MissingKey {
                collection: collection.to_string(),
            })?;

        let mut inner = self.write()?;
        if let Some(existing) = inner.entry(collection, &key) {
            if existing.version >= version {
                return Ok(ApplyOutcome::Stale);
            }
        }

        self.clock.observe(version.ts);
        let ts = self.clock.next();
        let doc = document.clone().with_key(&spec.key_path, &key);
        inner.log.push(ChangeRecord::put(
            ts,
            collection,
            Some(key.clone()),
            doc.clone(),
            version,
        ));
        inner.write(collection, key, Some(doc), version);
        Ok(ApplyOutcome::Applied)
    }

    async fn replay_delete(
        &self,
        collection: &str,
        key: &DocKey,
        version: Version,
    ) -> Result<ApplyOutcome> {
        self.schema.require(collection)?;

        let mut inner = self.write()?;
        let live = match inner.entry(collection, key) {
            Some(existing) if existing.version >= version => return Ok(ApplyOutcome::Stale),
            Some(existing) => existing.doc.is_some(),
            None => false,
        };

        self.clock.observe(version.ts);
        inner.write(collection, key.clone(), None, version);
        if !live {
            return Ok(ApplyOutcome::Absent);
        }

        let ts = self.clock.next();
        inner
            .log
            .push(ChangeRecord::delete(ts, collection, key.clone(), version));
        Ok(ApplyOutcome::Applied)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert(&self, collection: &str, document: Document) -> Result<DocKey> {
        let spec = self.schema.require(collection)?;
        let mut inner = self.write()?;

        let key = match spec.key_of(&document) {
            Some(key) => {
                if inner.live(collection, &key).is_some() {
                    return Err(StoreError::AlreadyExists {
                        collection: collection.to_string(),
                        key,
                    });
                }
                key
            }
            None if spec.auto_increment => inner.next_id(collection),
            None => {
                return Err(CoreError::MissingKey {
                    collection: collection.to_string(),
                }
                .into())
            }
        };

        let doc = document.with_key(&spec.key_path, &key);
        Ok(self.put_locked(&mut inner, collection, key, doc))
    }

    async fn update(&self, collection: &str, key: &DocKey, patch: Document) -> Result<Document> {
        let spec = self.schema.require(collection)?;
        let mut inner = self.write()?;

        let mut doc = inner
            .live(collection, key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                collection: collection.to_string(),
                key: key.clone(),
            })?;
        doc.merge(&patch);
        let doc = doc.with_key(&spec.key_path, key);

        self.put_locked(&mut inner, collection, key.clone(), doc.clone());
        Ok(doc)
    }

    async fn put(&self, collection: &str, document: Document) -> Result<DocKey> {
        let spec = self.schema.require(collection)?;
        let mut inner = self.write()?;

        let key = match spec.key_of(&document) {
            Some(key) => key,
            None if spec.auto_increment => inner.next_id(collection),
            None => {
                return Err(CoreError::MissingKey {
                    collection: collection.to_string(),
                }
                .into())
            }
        };

        let doc = document.with_key(&spec.key_path, &key);
        Ok(self.put_locked(&mut inner, collection, key, doc))
    }

    async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool> {
        self.schema.require(collection)?;
        let mut inner = self.write()?;

        if inner.live(collection, key).is_none() {
            return Ok(false);
        }

        let ts = self.clock.next();
        let version = Version::new(ts, self.device);
        inner
            .log
            .push(ChangeRecord::delete(ts, collection, key.clone(), version));
        inner.write(collection, key.clone(), None, version);
        Ok(true)
    }

    async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Document>> {
        self.schema.require(collection)?;
        let inner = self.read()?;
        Ok(inner.live(collection, key).cloned())
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        self.schema.require(collection)?;
        let inner = self.read()?;
        Ok(inner
            .collections
            .get(collection)
            .map(|c| c.values().filter_map(|e| e.doc.clone()).collect())
            .unwrap_or_default())
    }

    async fn version_of(&self, collection: &str, key: &DocKey) -> Result<Option<Version>> {
        self.schema.require(collection)?;
        let inner = self.read()?;
        Ok(inner.entry(collection, key).map(|e| e.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinic_sync_core::{ManualClock, Operation};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::from_value(value).unwrap()
    }

    fn store_at(ms: i64) -> (MemoryStore, ManualClock) {
        let clock = ManualClock::new(ms);
        let store = MemoryStore::with_clock(
            Schema::clinic(),
            DeviceId::from_bytes([1; 16]),
            Arc::new(clock.clone()),
        );
        (store, clock)
    }

    #[tokio::test]
    async fn test_insert_assigns_ids_and_logs() {
        let (store, _) = store_at(100);

        let a = store.insert("patients", doc(json!({"name": "Rao"}))).await.unwrap();
        let b = store.insert("patients", doc(json!({"name": "Iyer"}))).await.unwrap();

        assert_eq!(a, DocKey::Int(1));
        assert_eq!(b, DocKey::Int(2));

        let log = store.changes_since(Timestamp::ZERO).await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].value.as_ref().unwrap().get("id"), Some(&json!(1)));
        assert!(log[0].timestamp < log[1].timestamp);
    }

    #[tokio::test]
    async fn test_insert_duplicate_key_fails() {
        let (store, _) = store_at(100);
        store.insert("patients", doc(json!({"id": 4}))).await.unwrap();

        let err = store.insert("patients", doc(json!({"id": 4}))).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_logs_merged_document() {
        let (store, _) = store_at(100);
        let key = store
            .insert("patients", doc(json!({"name": "Rao", "phone": "99"})))
            .await
            .unwrap();

        store
            .update("patients", &key, doc(json!({"name": "Rao K"})))
            .await
            .unwrap();

        let log = store.changes_since(Timestamp::ZERO).await.unwrap();
        let last = log.last().unwrap();
        assert_eq!(
            last.value.as_ref().unwrap(),
            &doc(json!({"id": 1, "name": "Rao K", "phone": "99"}))
        );
    }

    #[tokio::test]
    async fn test_update_missing_fails() {
        let (store, _) = store_at(100);
        let err = store
            .update("patients", &DocKey::Int(9), Document::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_delete_missing_logs_nothing() {
        let (store, _) = store_at(100);

        assert!(!store.delete("invoiceItems", &DocKey::Int(5)).await.unwrap());
        assert!(store.changes_since(Timestamp::ZERO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_logs_key_only() {
        let (store, _) = store_at(100);
        let key = store.insert("invoiceItems", doc(json!({"qty": 2}))).await.unwrap();

        assert!(store.delete("invoiceItems", &key).await.unwrap());

        let log = store.changes_since(Timestamp::ZERO).await.unwrap();
        assert_eq!(log[1].operation, Operation::Delete);
        assert_eq!(log[1].key, Some(key.clone()));
        assert!(log[1].value.is_none());
        assert!(store.get("invoiceItems", &key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_collection() {
        let (store, _) = store_at(100);
        let err = store.insert("wards", Document::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::UnknownCollection(_))));
    }

    #[tokio::test]
    async fn test_replay_put_is_idempotent() {
        let (store, _) = store_at(100);
        let version = Version::new(Timestamp(50), DeviceId::from_bytes([2; 16]));
        let patient = doc(json!({"id": 1, "name": "Rao"}));

        let first = store.replay_put("patients", None, &patient, version).await.unwrap();
        let second = store.replay_put("patients", None, &patient, version).await.unwrap();

        assert_eq!(first, ApplyOutcome::Applied);
        assert_eq!(second, ApplyOutcome::Stale);
        assert_eq!(store.changes_since(Timestamp::ZERO).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replay_put_falls_back_to_key() {
        let (store, _) = store_at(100);
        let version = Version::new(Timestamp(50), DeviceId::from_bytes([2; 16]));

        store
            .replay_put("settings", Some(&DocKey::from("theme")), &doc(json!({"value": "dark"})), version)
            .await
            .unwrap();

        let setting = store.get("settings", &DocKey::from("theme")).await.unwrap().unwrap();
        assert_eq!(setting.get("key"), Some(&json!("theme")));
    }

    #[tokio::test]
    async fn test_replay_put_without_key_fails() {
        let (store, _) = store_at(100);
        let version = Version::new(Timestamp(50), DeviceId::from_bytes([2; 16]));

        let err = store
            .replay_put("patients", None, &doc(json!({"name": "x"})), version)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Core(CoreError::MissingKey { .. })));
    }

    #[tokio::test]
    async fn test_tombstone_blocks_older_put() {
        let (store, _) = store_at(100);
        let peer = DeviceId::from_bytes([2; 16]);
        let patient = doc(json!({"id": 3, "name": "Rao"}));

        store
            .replay_put("patients", None, &patient, Version::new(Timestamp(10), peer))
            .await
            .unwrap();
        let deleted = store
            .replay_delete("patients", &DocKey::Int(3), Version::new(Timestamp(30), peer))
            .await
            .unwrap();
        let resurrect = store
            .replay_put("patients", None, &patient, Version::new(Timestamp(20), peer))
            .await
            .unwrap();

        assert_eq!(deleted, ApplyOutcome::Applied);
        assert_eq!(resurrect, ApplyOutcome::Stale);
        assert!(store.get("patients", &DocKey::Int(3)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replay_delete_missing_is_absent() {
        let (store, _) = store_at(100);
        let version = Version::new(Timestamp(10), DeviceId::from_bytes([2; 16]));

        let outcome = store
            .replay_delete("invoiceItems", &DocKey::Int(5), version)
            .await
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Absent);
        assert!(store.changes_since(Timestamp::ZERO).await.unwrap().is_empty());
        assert_eq!(
            store.version_of("invoiceItems", &DocKey::Int(5)).await.unwrap(),
            Some(version)
        );
    }

    #[tokio::test]
    async fn test_local_write_after_replay_wins() {
        let (store, _) = store_at(100);
        let peer = DeviceId::from_bytes([2; 16]);

        store
            .replay_put("patients", None, &doc(json!({"id": 1})), Version::new(Timestamp(9_000), peer))
            .await
            .unwrap();
        store
            .update("patients", &DocKey::Int(1), doc(json!({"name": "local"})))
            .await
            .unwrap();

        let version = store.version_of("patients", &DocKey::Int(1)).await.unwrap().unwrap();
        assert!(version.ts > Timestamp(9_000));
        assert_eq!(version.device, store.device_id());
    }

    #[tokio::test]
    async fn test_append_and_changes_since() {
        let (store, _) = store_at(100);
        let peer = DeviceId::from_bytes([2; 16]);

        for ts in [300, 100, 200] {
            let record = ChangeRecord::local_put(
                Timestamp(ts),
                "patients",
                DocKey::Int(1),
                doc(json!({"id": 1})),
                peer,
            );
            store.append(&record).await.unwrap();
        }

        let since: Vec<i64> = store
            .changes_since(Timestamp(100))
            .await
            .unwrap()
            .iter()
            .map(|r| r.timestamp.0)
            .collect();
        assert_eq!(since, vec![200, 300]);
        assert_eq!(store.latest_timestamp().await.unwrap(), Timestamp(300));
    }
}
