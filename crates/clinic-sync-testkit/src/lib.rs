//! # Clinic Sync Testkit
//!
//! Testing utilities for Clinic Sync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known pairing secrets with their expected keys
//! - **Generators**: Proptest strategies for change records
//! - **Fixtures**: Deterministic in-memory devices and pairing helpers
//!
//! ## Golden Vectors
//!
//! Two devices only interoperate if they derive the same pairing key:
//!
//! ```rust
//! use clinic_sync_testkit::vectors::{all_vectors, derive_from_vector};
//!
//! for vector in all_vectors().iter().filter(|v| v.iterations == 1_000) {
//!     let key = derive_from_vector(vector);
//!     println!("{}: {}", vector.name, key.fingerprint());
//! }
//! ```
//!
//! ## Property Testing
//!
//! Use the generators with proptest:
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use clinic_sync_testkit::generators::{record_from_params, RecordParams};
//!
//! proptest! {
//!     #[test]
//!     fn records_are_valid(params: RecordParams) {
//!         let record = record_from_params(&params);
//!         prop_assert!(clinic_sync_core::validate_record(&record).is_ok());
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! Quickly set up two paired devices:
//!
//! ```rust,no_run
//! use clinic_sync_testkit::fixtures::{device_pair, pair_devices};
//!
//! async fn example() {
//!     let (_network, mut a, mut b) = device_pair();
//!     pair_devices(&mut a, &mut b, "1234").await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{device_pair, fast_config, pair_devices, TestDevice};
pub use generators::{record_from_params, records, RecordParams};
pub use vectors::{all_vectors, derive_from_vector, verify_all_vectors, GoldenVector};
