//! # Clinic Sync Peer
//!
//! Direct device-to-device replication of the change log.
//!
//! ## Overview
//!
//! Two devices pair by entering the same secret and shuttling an offer and
//! an answer descriptor between them by hand. Both derive the same pairing
//! key, the transport opens a link, and the [`SyncEngine`] runs one session
//! over it: every message is sealed in an encrypted envelope, foreign
//! records are replayed with last-writer-wins, and local log entries are
//! pushed on a timer until the link closes.
//!
//! ## Key Properties
//!
//! - **Idempotent**: replaying a record twice changes nothing the second time
//! - **Order-independent**: last-writer-wins by version, tombstones included
//! - **Fail-soft**: bad messages and bad records are logged and skipped
//! - **Session-scoped**: watermarks start at zero on every connection
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clinic_sync_core::Schema;
//! use clinic_sync_peer::{MemoryNetwork, SyncConfig, SyncEngine};
//! use clinic_sync_store::MemoryStore;
//!
//! async fn example() -> clinic_sync_peer::Result<()> {
//!     let network = MemoryNetwork::new();
//!     let store_a = Arc::new(MemoryStore::new(Schema::clinic()));
//!     let store_b = Arc::new(MemoryStore::new(Schema::clinic()));
//!     let mut a = SyncEngine::new(store_a, network.transport(), SyncConfig::default());
//!     let mut b = SyncEngine::new(store_b, network.transport(), SyncConfig::default());
//!
//!     let offer = a.create_offer("1234").await?;
//!     let answer = b.accept_offer("1234", &offer).await?;
//!     a.accept_answer(&answer).await?;
//!
//!     let session_a = a.start()?;
//!     let session_b = b.start()?;
//!     // ... later
//!     session_a.close();
//!     let report = session_b.finish().await?;
//!     println!("applied {} records", report.records_applied);
//!     Ok(())
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Device A                            Device B
//!   |======== link open ===============|
//!   |-------- Hello ------------------>|
//!   |-------- ReqState{since} -------->|
//!   |<------- Hello -------------------|
//!   |<------- ReqState{since} ---------|
//!   |<------- Ack ---------------------|
//!   |-------- Ack -------------------->|
//!   |<------- Changes | Noop ----------|
//!   |-------- Changes | Noop --------->|
//!   |        ... publish timer ...     |
//!   |-------- Changes ---------------->|
//!   |<------- Changes -----------------|
//! ```

pub mod activity;
pub mod convergence;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod messages;
pub mod replay;
pub mod retry;
pub mod session;
pub mod transport;

pub use activity::{ActivityEntry, ActivityKind, ActivityLog};
pub use convergence::{compute_state_digest, verify_convergence, ConvergenceResult, StateDigest};
pub use descriptor::{Descriptor, DescriptorKind};
pub use engine::{EngineState, SessionHandle, SyncConfig, SyncEngine};
pub use error::{ReplayError, Result, SyncError};
pub use messages::{limits, SyncMessage, PROTOCOL_VERSION};
pub use replay::replay_record;
pub use retry::{PendingRecord, RetryDecision, RetryQueue};
pub use session::{PairSession, SessionReport, Watermark};
pub use transport::{
    memory::MemoryNetwork, memory::MemoryTransport, tcp::TcpTransport, Link, LinkEvent,
    LinkSender, Transport,
};
