//! Error types for Clinic Sync Core.

use thiserror::Error;

/// Core errors raised while manipulating documents and schemas.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    #[error("document in {collection} has no usable key")]
    MissingKey { collection: String },

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("invalid document key: {0}")]
    InvalidKey(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Shape errors for change records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("collection name is empty")]
    EmptyCollection,

    #[error("collection name exceeds maximum length: {0} bytes")]
    CollectionNameTooLong(usize),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),

    #[error("put record carries no value")]
    PutWithoutValue,

    #[error("delete record carries neither key nor value")]
    DeleteWithoutKey,

    #[error("invalid version timestamp: {0}")]
    InvalidVersion(i64),
}
