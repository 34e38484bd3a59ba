//! Replay of foreign change records into the local store.

use clinic_sync_core::{validate_record, ChangeRecord, CoreError, Operation};
use clinic_sync_store::{ApplyOutcome, ReplaySink, StoreError};

use crate::error::ReplayError;

/// Apply one foreign record.
///
/// Puts upsert by the document's identifier, falling back to the record key.
/// Deletes remove by the record key, falling back to the identifier embedded
/// in the record value.
pub async fn replay_record<S>(sink: &S, record: &ChangeRecord) -> Result<ApplyOutcome, ReplayError>
where
    S: ReplaySink + ?Sized,
{
    validate_record(record)?;
    let collection = sink
        .schema()
        .get(&record.collection)
        .ok_or_else(|| ReplayError::UnknownCollection(record.collection.clone()))?;

    let result = match record.operation {
        Operation::Put => {
            let document = record.value.as_ref().ok_or_else(|| ReplayError::MissingKey {
                collection: record.collection.clone(),
            })?;
            sink.replay_put(
                &record.collection,
                record.key.as_ref(),
                document,
                record.version,
            )
            .await
        }
        Operation::Delete => {
            let key = record
                .key
                .clone()
                .or_else(|| record.value.as_ref().and_then(|v| collection.key_of(v)))
                .ok_or_else(|| ReplayError::MissingKey {
                    collection: record.collection.clone(),
                })?;
            sink.replay_delete(&record.collection, &key, record.version)
                .await
        }
    };

    result.map_err(|e| match e {
        StoreError::Core(CoreError::UnknownCollection(name)) => ReplayError::UnknownCollection(name),
        StoreError::Core(CoreError::MissingKey { collection }) => {
            ReplayError::MissingKey { collection }
        }
        other => ReplayError::Store(other),
    })
}
