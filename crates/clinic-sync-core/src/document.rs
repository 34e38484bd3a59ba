//! Documents: the identifier-keyed JSON objects stored per collection.
//!
//! The sync core never interprets document fields beyond the identifier.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::types::DocKey;

/// A JSON object belonging to one collection.
///
/// Field order is canonical (sorted), so two equal documents always encode
/// to the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value. Fails unless the value is an object.
    pub fn from_value(value: Value) -> Result<Self, CoreError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(CoreError::NotAnObject),
        }
    }

    /// Unwrap into a JSON value.
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Get a field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Set a field, returning the previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// Read the identifier stored under `key_path`.
    pub fn key(&self, key_path: &str) -> Option<DocKey> {
        self.0.get(key_path).and_then(DocKey::from_value)
    }

    /// Return a copy with `key_path` set to `key`.
    pub fn with_key(mut self, key_path: &str, key: &DocKey) -> Self {
        self.0.insert(key_path.to_string(), key.to_value());
        self
    }

    /// Shallow merge: every field of `patch` overwrites the same field here.
    pub fn merge(&mut self, patch: &Document) {
        for (field, value) in &patch.0 {
            self.0.insert(field.clone(), value.clone());
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encode as compact JSON.
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }

    /// Decode from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CoreError::DecodingError(e.to_string()))?;
        Self::from_value(value)
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Document {
    type Error = CoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_objects() {
        assert!(Document::from_value(json!([1, 2])).is_err());
        assert!(Document::from_value(json!("text")).is_err());
        assert!(Document::from_value(json!({})).is_ok());
    }

    #[test]
    fn test_key_lookup() {
        let doc = Document::from_value(json!({"id": 7, "name": "Rao"})).unwrap();
        assert_eq!(doc.key("id"), Some(DocKey::Int(7)));
        assert_eq!(doc.key("uid"), None);
    }

    #[test]
    fn test_merge_overwrites_fields() {
        let mut doc = Document::from_value(json!({"id": 1, "name": "Rao", "phone": "123"})).unwrap();
        let patch = Document::from_value(json!({"name": "Rao K"})).unwrap();

        doc.merge(&patch);

        assert_eq!(doc.get("name"), Some(&json!("Rao K")));
        assert_eq!(doc.get("phone"), Some(&json!("123")));
        assert_eq!(doc.len(), 3);
    }

    #[test]
    fn test_json_is_canonical() {
        let a = Document::from_value(json!({"b": 1, "a": 2})).unwrap();
        let b = Document::from_value(json!({"a": 2, "b": 1})).unwrap();
        assert_eq!(a.to_json(), b.to_json());
    }
}
