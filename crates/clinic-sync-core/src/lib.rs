//! # Clinic Sync Core
//!
//! Pure types for the Clinic Sync replication core: change records,
//! documents, identifiers, versions, and the collection schema.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`ChangeRecord`] - One logged mutation (collection, operation, key, value, timestamp)
//! - [`Document`] - An identifier-keyed JSON object owned by a collection
//! - [`DocKey`] - A document identifier (integer or string)
//! - [`Version`] - The last-writer-wins stamp of a write
//! - [`Schema`] - The tracked collections and their key paths
//! - [`LogClock`] - Strictly increasing change-log timestamps

pub mod clock;
pub mod document;
pub mod error;
pub mod record;
pub mod schema;
pub mod types;
pub mod validation;

pub use clock::{Clock, LogClock, ManualClock, SystemClock};
pub use document::Document;
pub use error::{CoreError, ValidationError};
pub use record::{ChangeRecord, Operation};
pub use schema::{CollectionSchema, Schema};
pub use types::{DeviceId, DocKey, Timestamp, Version};
pub use validation::{validate_record, MAX_COLLECTION_NAME_LEN};
