//! Proptest generators for property-based testing.

use proptest::prelude::*;
use serde_json::json;

use clinic_sync_core::{ChangeRecord, DeviceId, DocKey, Document, Timestamp, Version};

/// Collections the generators write to. All are auto-increment `id`.
pub const COLLECTIONS: &[&str] = &["patients", "appointments", "invoices", "invoiceItems"];

/// Generate a device id.
pub fn device_id() -> impl Strategy<Value = DeviceId> {
    any::<[u8; 16]>().prop_map(DeviceId::from_bytes)
}

/// Generate a plausible log timestamp.
pub fn timestamp() -> impl Strategy<Value = Timestamp> {
    (1i64..=1_000_000).prop_map(Timestamp)
}

/// Generate a small integer key, so edits collide often.
pub fn doc_key() -> impl Strategy<Value = DocKey> {
    (1i64..=8).prop_map(DocKey::Int)
}

/// Generate a tracked collection name.
pub fn collection() -> impl Strategy<Value = &'static str> {
    prop::sample::select(COLLECTIONS)
}

/// Generate a document body for `key`.
pub fn document(key: DocKey) -> impl Strategy<Value = Document> {
    ("[a-zA-Z ]{0,16}", 0u32..10_000).prop_map(move |(name, amount)| {
        Document::from_value(json!({"name": name, "amount": amount}))
            .map(|d| d.with_key("id", &key))
            .unwrap_or_default()
    })
}

/// Parameters for generating a foreign change record.
#[derive(Debug, Clone)]
pub struct RecordParams {
    pub collection: &'static str,
    pub key: DocKey,
    pub delete: bool,
    pub version: Version,
    pub body: Document,
}

impl Arbitrary for RecordParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (collection(), doc_key(), prop::bool::weighted(0.2), timestamp(), device_id())
            .prop_flat_map(|(collection, key, delete, ts, device)| {
                document(key.clone()).prop_map(move |body| RecordParams {
                    collection,
                    key: key.clone(),
                    delete,
                    version: Version::new(ts, device),
                    body,
                })
            })
            .boxed()
    }
}

/// Build the record described by `params`, logged at the version timestamp.
pub fn record_from_params(params: &RecordParams) -> ChangeRecord {
    let ts = params.version.ts;
    if params.delete {
        ChangeRecord::delete(ts, params.collection, params.key.clone(), params.version)
    } else {
        ChangeRecord::put(
            ts,
            params.collection,
            Some(params.key.clone()),
            params.body.clone(),
            params.version,
        )
    }
}

/// Generate a batch of foreign records.
pub fn records(max: usize) -> impl Strategy<Value = Vec<ChangeRecord>> {
    prop::collection::vec(any::<RecordParams>(), 0..=max)
        .prop_map(|params| params.iter().map(record_from_params).collect())
}
