//! # Clinic Sync Store
//!
//! Storage abstraction for Clinic Sync. Provides the change log, the replay
//! sink, and a tracked document store, with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! The sync engine depends on two narrow traits: [`ChangeLog`] to read what
//! changed locally and [`ReplaySink`] to apply what changed remotely. The
//! application mutates documents through [`Store`], whose hooks append one
//! change record per mutation, atomically with the write.
//!
//! ## Key Types
//!
//! - [`ChangeLog`] - Append-only log, queried by timestamp watermark
//! - [`ReplaySink`] - Idempotent last-writer-wins replay of foreign writes
//! - [`Store`] - Tracked local mutations and reads
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clinic_sync_core::{Document, Schema};
//! use clinic_sync_store::{SqliteStore, Store};
//!
//! async fn example() -> clinic_sync_store::Result<()> {
//!     let store = SqliteStore::open("clinic.db", Schema::clinic())?;
//!
//!     let patient = Document::from_value(serde_json::json!({"name": "Rao"}))?;
//!     let id = store.insert("patients", patient).await?;
//!     assert!(store.get("patients", &id).await?.is_some());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic hooks**: the document write and its log entry commit together
//! - **Strictly increasing log clock**: no two entries share a timestamp
//! - **Tombstones**: deleted documents keep their version so older writes
//!   cannot resurrect them

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{ApplyOutcome, ChangeLog, ReplaySink, Store};
