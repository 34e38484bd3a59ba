//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking. Every tracked mutation writes
//! the document row and its change-log row in one transaction.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};

use clinic_sync_core::{
    validate_record, ChangeRecord, Clock, CollectionSchema, CoreError, DeviceId, DocKey,
    Document, LogClock, Operation, Schema, SystemClock, Timestamp, Version,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{ApplyOutcome, ChangeLog, ReplaySink, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    schema: Schema,
    device: DeviceId,
    /// Shared with blocking tasks; timestamps are issued under the connection lock.
    clock: Arc<LogClock>,
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

/// Context handed to blocking closures.
#[derive(Clone)]
struct Ctx {
    device: DeviceId,
    clock: Arc<LogClock>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist. The device
    /// id is created on first open and reused afterwards.
    pub fn open(path: impl AsRef<Path>, schema: Schema) -> Result<Self> {
        Self::open_with_clock(path, schema, Arc::new(SystemClock))
    }

    /// Open a SQLite database with an explicit wall clock.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        schema: Schema,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, schema, clock)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory(schema: Schema) -> Result<Self> {
        Self::open_memory_with_clock(schema, Arc::new(SystemClock))
    }

    /// Open an in-memory SQLite database with an explicit wall clock.
    pub fn open_memory_with_clock(schema: Schema, clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, schema, clock)
    }

    fn init(mut conn: Connection, schema: Schema, clock: Arc<dyn Clock>) -> Result<Self> {
        migration::migrate(&mut conn)?;
        let device = load_or_create_device(&conn)?;

        // Resume after everything already logged or stamped.
        let last: i64 = conn.query_row(
            "SELECT MAX(
                (SELECT COALESCE(MAX(ts), 0) FROM change_log),
                (SELECT COALESCE(MAX(version_ts), 0) FROM documents)
            )",
            [],
            |row| row.get(0),
        )?;
        tracing::debug!(device = %device, last_ts = last, "opened sqlite store");

        Ok(Self {
            schema,
            device,
            clock: Arc::new(LogClock::resume(clock, Timestamp(last))),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn ctx(&self) -> Ctx {
        Ctx {
            device: self.device,
            clock: self.clock.clone(),
        }
    }

    fn collection(&self, name: &str) -> Result<CollectionSchema> {
        Ok(self.schema.require(name)?.clone())
    }

    /// Run a blocking operation on the connection.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection, &Ctx) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        let ctx = self.ctx();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn, &ctx)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn load_or_create_device(conn: &Connection) -> Result<DeviceId> {
    let existing: Option<Vec<u8>> = conn
        .query_row("SELECT device_id FROM device WHERE id = 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    match existing {
        Some(bytes) => decode_device(bytes),
        None => {
            let device = DeviceId::random();
            conn.execute(
                "INSERT INTO device (id, device_id) VALUES (1, ?1)",
                params![device.as_bytes().as_slice()],
            )?;
            Ok(device)
        }
    }
}

fn decode_device(bytes: Vec<u8>) -> Result<DeviceId> {
    let bytes: [u8; 16] = bytes
        .try_into()
        .map_err(|_| StoreError::InvalidData("device id is not 16 bytes".into()))?;
    Ok(DeviceId::from_bytes(bytes))
}

fn decode_key(text: &str) -> Result<DocKey> {
    DocKey::decode(text).ok_or_else(|| StoreError::InvalidData(format!("bad key: {}", text)))
}

fn decode_body(text: Option<String>) -> Result<Option<Document>> {
    text.map(|t| Document::from_json(&t))
        .transpose()
        .map_err(StoreError::from)
}

/// A stored entry: live document or tombstone, with its version.
fn load_entry(
    conn: &Connection,
    collection: &str,
    key: &DocKey,
) -> Result<Option<(Option<Document>, Version)>> {
    let row: Option<(Option<String>, i64, Vec<u8>)> = conn
        .query_row(
            "SELECT body, version_ts, version_device FROM documents
             WHERE collection = ?1 AND doc_key = ?2",
            params![collection, key.encode()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?;

    match row {
        Some((body, ts, device)) => Ok(Some((
            decode_body(body)?,
            Version::new(Timestamp(ts), decode_device(device)?),
        ))),
        None => Ok(None),
    }
}

fn write_entry(
    conn: &Connection,
    collection: &str,
    key: &DocKey,
    doc: Option<&Document>,
    version: Version,
) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO documents (collection, doc_key, body, version_ts, version_device)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            collection,
            key.encode(),
            doc.map(Document::to_json),
            version.ts.0,
            version.device.as_bytes().as_slice(),
        ],
    )?;

    if let Some(id) = key.as_int() {
        conn.execute(
            "INSERT INTO sequences (collection, last_id) VALUES (?1, ?2)
             ON CONFLICT(collection) DO UPDATE SET last_id = MAX(last_id, excluded.last_id)",
            params![collection, id],
        )?;
    }
    Ok(())
}

fn next_id(conn: &Connection, collection: &str) -> Result<DocKey> {
    let last: i64 = conn
        .query_row(
            "SELECT last_id FROM sequences WHERE collection = ?1",
            params![collection],
            |row| row.get(0),
        )
        .optional()?
        .unwrap_or(0);
    Ok(DocKey::Int(last + 1))
}

fn append_log(conn: &Connection, record: &ChangeRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO change_log (ts, collection, operation, doc_key, body, version_ts, version_device)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            record.timestamp.0,
            record.collection,
            record.operation.to_u8(),
            record.key.as_ref().map(DocKey::encode),
            record.value.as_ref().map(Document::to_json),
            record.version.ts.0,
            record.version.device.as_bytes().as_slice(),
        ],
    )?;
    Ok(())
}

/// Raw change_log columns, decoded outside the row callback.
struct RawRecord {
    ts: i64,
    collection: String,
    operation: u8,
    key: Option<String>,
    body: Option<String>,
    version_ts: i64,
    version_device: Vec<u8>,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ts: row.get("ts")?,
            collection: row.get("collection")?,
            operation: row.get("operation")?,
            key: row.get("doc_key")?,
            body: row.get("body")?,
            version_ts: row.get("version_ts")?,
            version_device: row.get("version_device")?,
        })
    }

    fn into_record(self) -> Result<ChangeRecord> {
        let operation = Operation::from_u8(self.operation).ok_or_else(|| {
            StoreError::InvalidData(format!("unknown operation: {}", self.operation))
        })?;
        Ok(ChangeRecord {
            timestamp: Timestamp(self.ts),
            collection: self.collection,
            operation,
            key: self.key.as_deref().map(decode_key).transpose()?,
            value: decode_body(self.body)?,
            version: Version::new(
                Timestamp(self.version_ts),
                decode_device(self.version_device)?,
            ),
        })
    }
}

/// Write a local document and its log entry.
fn put_local(
    conn: &Connection,
    ctx: &Ctx,
    collection: &str,
    key: &DocKey,
    doc: &Document,
) -> Result<()> {
    let ts = ctx.clock.next();
    let version = Version::new(ts, ctx.device);
    write_entry(conn, collection, key, Some(doc), version)?;
    append_log(
        conn,
        &ChangeRecord::put(ts, collection, Some(key.clone()), doc.clone(), version),
    )
}

fn missing_key(collection: &str) -> StoreError {
    CoreError::MissingKey {
        collection: collection.to_string(),
    }
    .into()
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait implementations
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl ChangeLog for SqliteStore {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    async fn append(&self, record: &ChangeRecord) -> Result<()> {
        validate_record(record)?;
        let record = record.clone();

        self.with_conn(move |conn, ctx| {
            ctx.clock.observe(record.timestamp);
            append_log(conn, &record)
        })
        .await
    }

    async fn changes_since(&self, since: Timestamp) -> Result<Vec<ChangeRecord>> {
        self.with_conn(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT ts, collection, operation, doc_key, body, version_ts, version_device
                 FROM change_log WHERE ts > ?1 ORDER BY ts, seq",
            )?;
            let raw = stmt
                .query_map(params![since.0], RawRecord::from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            raw.into_iter().map(RawRecord::into_record).collect()
        })
        .await
    }

    async fn latest_timestamp(&self) -> Result<Timestamp> {
        self.with_conn(|conn, _| {
            let ts: i64 =
                conn.query_row("SELECT COALESCE(MAX(ts), 0) FROM change_log", [], |row| {
                    row.get(0)
                })?;
            Ok(Timestamp(ts))
        })
        .await
    }
}

#[async_trait]
impl ReplaySink for SqliteStore {
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
        let spec = self.collection(collection)?;
        let key = spec
            .key_of(document)
            .or_else(|| key.cloned())
            .ok_or_else(|| missing_key(collection))?;
        let doc = document.clone().with_key(&spec.key_path, &key);

        self.with_conn(move |conn, ctx| {
            let tx = conn.transaction()?;
            if let Some((_, stored)) = load_entry(&tx, &spec.name, &key)? {
                if stored >= version {
                    return Ok(ApplyOutcome::Stale);
                }
            }

            ctx.clock.observe(version.ts);
            let ts = ctx.clock.next();
            write_entry(&tx, &spec.name, &key, Some(&doc), version)?;
            append_log(
                &tx,
                &ChangeRecord::put(ts, spec.name.clone(), Some(key), doc, version),
            )?;
            tx.commit()?;
            Ok(ApplyOutcome::Applied)
        })
        .await
    }

    async fn replay_delete(
        &self,
        collection: &str,
        key: &DocKey,
        version: Version,
    ) -> Result<ApplyOutcome> {
        let spec = self.collection(collection)?;
        let key = key.clone();

        self.with_conn(move |conn, ctx| {
            let tx = conn.transaction()?;
            let live = match load_entry(&tx, &spec.name, &key)? {
                Some((_, stored)) if stored >= version => return Ok(ApplyOutcome::Stale),
                Some((doc, _)) => doc.is_some(),
                None => false,
            };

            ctx.clock.observe(version.ts);
            write_entry(&tx, &spec.name, &key, None, version)?;
            let outcome = if live {
                let ts = ctx.clock.next();
                append_log(
                    &tx,
                    &ChangeRecord::delete(ts, spec.name.clone(), key, version),
                )?;
                ApplyOutcome::Applied
            } else {
                ApplyOutcome::Absent
            };
            tx.commit()?;
            Ok(outcome)
        })
        .await
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert(&self, collection: &str, document: Document) -> Result<DocKey> {
        let spec = self.collection(collection)?;

        self.with_conn(move |conn, ctx| {
            let tx = conn.transaction()?;
            let key = match spec.key_of(&document) {
                Some(key) => {
                    if let Some((Some(_), _)) = load_entry(&tx, &spec.name, &key)? {
                        return Err(StoreError::AlreadyExists {
                            collection: spec.name.clone(),
                            key,
                        });
                    }
                    key
                }
                None if spec.auto_increment => next_id(&tx, &spec.name)?,
                None => return Err(missing_key(&spec.name)),
            };

            let doc = document.with_key(&spec.key_path, &key);
            put_local(&tx, ctx, &spec.name, &key, &doc)?;
            tx.commit()?;
            Ok(key)
        })
        .await
    }

    async fn update(&self, collection: &str, key: &DocKey, patch: Document) -> Result<Document> {
        let spec = self.collection(collection)?;
        let key = key.clone();

        self.with_conn(move |conn, ctx| {
            let tx = conn.transaction()?;
            let mut doc = match load_entry(&tx, &spec.name, &key)? {
                Some((Some(doc), _)) => doc,
                _ => {
                    return Err(StoreError::NotFound {
                        collection: spec.name.clone(),
                        key,
                    })
                }
            };
            doc.merge(&patch);
            let doc = doc.with_key(&spec.key_path, &key);

            put_local(&tx, ctx, &spec.name, &key, &doc)?;
            tx.commit()?;
            Ok(doc)
        })
        .await
    }

    async fn put(&self, collection: &str, document: Document) -> Result<DocKey> {
        let spec = self.collection(collection)?;

        self.with_conn(move |conn, ctx| {
            let tx = conn.transaction()?;
            let key = match spec.key_of(&document) {
                Some(key) => key,
                None if spec.auto_increment => next_id(&tx, &spec.name)?,
                None => return Err(missing_key(&spec.name)),
            };

            let doc = document.with_key(&spec.key_path, &key);
            put_local(&tx, ctx, &spec.name, &key, &doc)?;
            tx.commit()?;
            Ok(key)
        })
        .await
    }

    async fn delete(&self, collection: &str, key: &DocKey) -> Result<bool> {
        let spec = self.collection(collection)?;
        let key = key.clone();

        self.with_conn(move |conn, ctx| {
            let tx = conn.transaction()?;
            if !matches!(load_entry(&tx, &spec.name, &key)?, Some((Some(_), _))) {
                return Ok(false);
            }

            let ts = ctx.clock.next();
            let version = Version::new(ts, ctx.device);
            write_entry(&tx, &spec.name, &key, None, version)?;
            append_log(
                &tx,
                &ChangeRecord::delete(ts, spec.name.clone(), key, version),
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn get(&self, collection: &str, key: &DocKey) -> Result<Option<Document>> {
        let spec = self.collection(collection)?;
        let key = key.clone();

        self.with_conn(move |conn, _| {
            Ok(load_entry(conn, &spec.name, &key)?.and_then(|(doc, _)| doc))
        })
        .await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>> {
        let spec = self.collection(collection)?;

        self.with_conn(move |conn, _| {
            let mut stmt = conn.prepare(
                "SELECT doc_key, body FROM documents
                 WHERE collection = ?1 AND body IS NOT NULL",
            )?;
            let rows = stmt
                .query_map(params![spec.name], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let mut docs = rows
                .into_iter()
                .map(|(key, body)| -> Result<(DocKey, Document)> {
                    Ok((decode_key(&key)?, Document::from_json(&body)?))
                })
                .collect::<Result<Vec<_>>>()?;
            docs.sort_by(|a, b| a.0.cmp(&b.0));
            Ok(docs.into_iter().map(|(_, doc)| doc).collect())
        })
        .await
    }

    async fn version_of(&self, collection: &str, key: &DocKey) -> Result<Option<Version>> {
        let spec = self.collection(collection)?;
        let key = key.clone();

        self.with_conn(move |conn, _| {
            Ok(load_entry(conn, &spec.name, &key)?.map(|(_, version)| version))
        })
        .await
    }
}
