//! # Clinic Sync
//!
//! Local-first clinic records with direct, encrypted device-to-device sync.
//!
//! ## Overview
//!
//! Each clinic device keeps its own document store. Every tracked mutation
//! is appended to a change log in the same transaction. When two devices
//! pair, they replay each other's log with last-writer-wins and keep
//! pushing new entries until the link closes. No server is involved.
//!
//! - **Store**: collections of JSON documents, in memory or SQLite
//! - **Change log**: timestamped, versioned record of every mutation
//! - **Pairing**: a shared secret plus a hand-carried offer and answer
//! - **Sync**: sealed messages over a peer link, bidirectional drain
//!
//! ## Key Concepts
//!
//! - **Version**: `(timestamp, device)`; the greater version wins.
//! - **Tombstone**: a deleted document keeps its version so an older put
//!   cannot resurrect it.
//! - **Watermark**: the newest peer timestamp already processed in a session.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use clinic_sync::{Device, DeviceConfig, TcpTransport};
//! use clinic_sync::core::Document;
//!
//! async fn example() -> clinic_sync::Result<()> {
//!     let mut front_desk = Device::open("front-desk.db", TcpTransport::localhost(), DeviceConfig::default())?;
//!     let mut pharmacy = Device::open("pharmacy.db", TcpTransport::localhost(), DeviceConfig::default())?;
//!
//!     let patient = Document::from_json(r#"{"name": "Rao"}"#)?;
//!     front_desk.insert("patients", patient).await?;
//!
//!     let offer = front_desk.create_offer("1234").await?;
//!     let answer = pharmacy.accept_offer("1234", &offer).await?;
//!     front_desk.accept_answer(&answer).await?;
//!
//!     let outgoing = front_desk.start_sync()?;
//!     let incoming = pharmacy.start_sync()?;
//!     // ... later
//!     outgoing.close();
//!     let report = incoming.finish().await?;
//!     println!("applied {} records", report.records_applied);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `clinic_sync::core` - Documents, records, versions, schema, clocks
//! - `clinic_sync::store` - Store traits, memory and SQLite stores
//! - `clinic_sync::crypto` - Pairing keys and envelopes
//! - `clinic_sync::peer` - Transports and the sync engine

pub mod device;
pub mod error;

// Re-export component crates
pub use clinic_sync_core as core;
pub use clinic_sync_crypto as crypto;
pub use clinic_sync_peer as peer;
pub use clinic_sync_store as store;

// Re-export main types for convenience
pub use device::{Device, DeviceConfig};
pub use error::{ClinicError, Result};

// Re-export commonly used types
pub use clinic_sync_core::{ChangeRecord, DeviceId, DocKey, Document, Operation, Schema, Timestamp, Version};
pub use clinic_sync_peer::{
    ActivityKind, ConvergenceResult, EngineState, MemoryNetwork, MemoryTransport, SessionHandle,
    SessionReport, SyncConfig, TcpTransport,
};
pub use clinic_sync_store::{MemoryStore, SqliteStore, Store};
