//! The Device: one clinic installation.
//!
//! A device owns a document store whose every mutation lands in the change
//! log, plus a sync engine that pairs with one peer at a time and
//! replicates that log.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clinic_sync_core::{Clock, DeviceId, DocKey, Document, Schema, SystemClock, Version};
use clinic_sync_peer::{
    compute_state_digest, verify_convergence, ActivityLog, ConvergenceResult, EngineState,
    SessionHandle, SessionReport, StateDigest, SyncConfig, SyncEngine, Transport,
};
use clinic_sync_store::{MemoryStore, SqliteStore, Store};

use crate::error::{ClinicError, Result};

/// Configuration for a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Tracked collections.
    pub schema: Schema,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            schema: Schema::clinic(),
            sync: SyncConfig::default(),
        }
    }
}

impl DeviceConfig {
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.schema.is_empty() {
            return Err(ClinicError::Config("schema has no collections".into()));
        }
        if self.sync.publish_interval == Duration::ZERO {
            return Err(ClinicError::Config("publish interval must be positive".into()));
        }
        if self.sync.kdf_iterations == 0 {
            return Err(ClinicError::Config("kdf iterations must be positive".into()));
        }
        Ok(())
    }
}

/// A clinic device: a tracked store plus its sync engine.
pub struct Device<S: Store, T: Transport> {
    store: Arc<S>,
    engine: SyncEngine<S, T>,
}

impl<T: Transport> Device<MemoryStore, T> {
    /// A device backed by an in-memory store.
    pub fn in_memory(transport: T, config: DeviceConfig) -> Result<Self> {
        Self::in_memory_with_clock(DeviceId::random(), transport, config, Arc::new(SystemClock))
    }

    /// An in-memory device with a fixed identity and clock.
    pub fn in_memory_with_clock(
        device: DeviceId,
        transport: T,
        config: DeviceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let store = MemoryStore::with_clock(config.schema.clone(), device, clock.clone());
        Self::with_clock(store, transport, config, clock)
    }
}

impl<T: Transport> Device<SqliteStore, T> {
    /// A device backed by a SQLite database at `path`.
    pub fn open(path: impl AsRef<Path>, transport: T, config: DeviceConfig) -> Result<Self> {
        Self::open_with_clock(path, transport, config, Arc::new(SystemClock))
    }

    /// A SQLite-backed device with an explicit clock.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        transport: T,
        config: DeviceConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let store = SqliteStore::open_with_clock(path, config.schema.clone(), clock.clone())?;
        Self::with_clock(store, transport, config, clock)
    }
}

impl<S, T> Device<S, T>
where
    S: Store + 'static,
    T: Transport,
{
    /// Wrap an existing store.
    pub fn new(store: S, transport: T, config: DeviceConfig) -> Result<Self> {
        Self::with_clock(store, transport, config, Arc::new(SystemClock))
    }

    /// Wrap an existing store, reading wall time from `clock`.
    pub fn with_clock(store: S, transport: T, config: DeviceConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(store);
        let engine = SyncEngine::with_clock(store.clone(), transport, config.sync, clock);
        tracing::debug!(device = %store.device_id(), "device ready");
        Ok(Self { store, engine })
    }

    /// This device's identity.
    pub fn device_id(&self) -> DeviceId {
        self.store.device_id()
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The sync engine.
    pub fn engine(&self) -> &SyncEngine<S, T> {
        &self.engine
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a document. Auto-increment collections assign the id.
    pub async fn insert(&self, collection: &str, document: Document) -> Result<DocKey> {
        Ok(self.store.insert(collection, document).await?)
    }

    /// Create or replace a document.
    pub async fn put(&self, collection: &str, document: Document) -> Result<DocKey> {
        Ok(self.store.put(collection, document).await?)
    }

    /// Merge fields into an existing document.
    pub async fn update(&self, collection: &str, key: &DocKey, patch: Document) -> Result<Document> {
        Ok(self.store.update(collection, key, patch).await?)
    }

    /// Delete a document. Returns whether it existed.
    pub async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool> {
        Ok(self.store.delete(collection, key).await?)
    }

    pub async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Document>> {
        Ok(self.store.get(collection, key).await?)
    }

    pub async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        Ok(self.store.list(collection).await?)
    }

    pub async fn version_of(&self, collection: &str, key: &DocKey) -> Result<Option<Version>> {
        Ok(self.store.version_of(collection, key).await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pairing
    // ─────────────────────────────────────────────────────────────────────────

    /// Start pairing. Returns the offer text to show the other device.
    pub async fn create_offer(&mut self, secret: &str) -> Result<String> {
        Ok(self.engine.create_offer(secret).await?)
    }

    /// Answer another device's offer. Returns the answer text.
    pub async fn accept_offer(&mut self, secret: &str, offer: &str) -> Result<String> {
        Ok(self.engine.accept_offer(secret, offer).await?)
    }

    /// Finish pairing with the other device's answer.
    pub async fn accept_answer(&mut self, answer: &str) -> Result<()> {
        Ok(self.engine.accept_answer(answer).await?)
    }

    /// Start syncing in the background.
    pub fn start_sync(&mut self) -> Result<SessionHandle> {
        Ok(self.engine.start()?)
    }

    /// Sync until the link closes.
    pub async fn sync(&mut self) -> Result<SessionReport> {
        Ok(self.engine.run().await?)
    }

    /// Abandon pairing or close the running session.
    pub fn disconnect(&mut self) {
        self.engine.disconnect();
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn activity(&self) -> &ActivityLog {
        self.engine.activity()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convergence
    // ─────────────────────────────────────────────────────────────────────────

    /// Digest of every live document.
    pub async fn state_digest(&self) -> Result<StateDigest> {
        Ok(compute_state_digest(self.store.as_ref()).await?)
    }

    /// Compare live documents with another device.
    pub async fn converged_with<S2, T2>(&self, other: &Device<S2, T2>) -> Result<ConvergenceResult>
    where
        S2: Store + 'static,
        T2: Transport,
    {
        Ok(verify_convergence(self.store.as_ref(), other.store.as_ref()).await?)
    }
}
