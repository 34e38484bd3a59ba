//! Change record validation: shape checks only.
//!
//! Whether a collection exists or a key resolves is decided by the store at
//! replay time, not here.

use crate::error::ValidationError;
use crate::record::{ChangeRecord, Operation};

/// Maximum length of a collection name, in bytes.
pub const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Validate the shape of a change record.
///
/// Checks:
/// - collection name is present and bounded
/// - log timestamp and version timestamp are positive
/// - puts carry a value; deletes carry a key or a value to read one from
pub fn validate_record(record: &ChangeRecord) -> Result<(), ValidationError> {
    if record.collection.is_empty() {
        return Err(ValidationError::EmptyCollection);
    }
    if record.collection.len() > MAX_COLLECTION_NAME_LEN {
        return Err(ValidationError::CollectionNameTooLong(
            record.collection.len(),
        ));
    }

    if record.timestamp.0 <= 0 {
        return Err(ValidationError::InvalidTimestamp(record.timestamp.0));
    }
    if record.version.ts.0 <= 0 {
        return Err(ValidationError::InvalidVersion(record.version.ts.0));
    }

    match record.operation {
        Operation::Put if record.value.is_none() => Err(ValidationError::PutWithoutValue),
        Operation::Delete if record.key.is_none() && record.value.is_none() => {
            Err(ValidationError::DeleteWithoutKey)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::types::{DeviceId, DocKey, Timestamp, Version};
    use serde_json::json;

    fn device() -> DeviceId {
        DeviceId::from_bytes([7; 16])
    }

    #[test]
    fn test_valid_put() {
        let doc = Document::from_value(json!({"id": 1})).unwrap();
        let record = ChangeRecord::local_put(Timestamp(10), "patients", DocKey::Int(1), doc, device());
        assert_eq!(validate_record(&record), Ok(()));
    }

    #[test]
    fn test_put_without_value() {
        let mut record =
            ChangeRecord::local_put(Timestamp(10), "patients", DocKey::Int(1), Document::new(), device());
        record.value = None;
        assert_eq!(validate_record(&record), Err(ValidationError::PutWithoutValue));
    }

    #[test]
    fn test_delete_without_key_or_value() {
        let mut record = ChangeRecord::local_delete(Timestamp(10), "patients", DocKey::Int(1), device());
        record.key = None;
        assert_eq!(validate_record(&record), Err(ValidationError::DeleteWithoutKey));
    }

    #[test]
    fn test_rejects_empty_collection_and_zero_timestamp() {
        let record = ChangeRecord::local_delete(Timestamp(10), "", DocKey::Int(1), device());
        assert_eq!(validate_record(&record), Err(ValidationError::EmptyCollection));

        let record = ChangeRecord::delete(
            Timestamp(0),
            "patients",
            DocKey::Int(1),
            Version::new(Timestamp(5), device()),
        );
        assert_eq!(validate_record(&record), Err(ValidationError::InvalidTimestamp(0)));
    }
}
