//! Error types and result types for model-layer operations.
//!
//! This module provides error handling for schema compilation, validation,
//! query evaluation and store access. Use [`KeyformResult<T>`] as the return
//! type for fallible operations.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur in the model layer.
///
/// Configuration and validation failures are detected before any store work
/// begins; store failures are relayed unmodified.
#[derive(Error, Debug)]
pub enum KeyformError {
    /// A model definition is missing or invalid (empty name, bad template,
    /// undefined model). Always raised synchronously, before any store call.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// A schema constraint was violated. Carries the dotted path of the
    /// offending field and a human-readable message.
    #[error("Validation failed for field '{path}': {message}")]
    Validation {
        /// Dotted path of the field that failed validation.
        path: String,
        /// Human-readable description of the failure.
        message: String,
    },
    /// A query used an operator key outside the recognized operator set.
    /// Aborts evaluation of the whole query.
    #[error("Unsupported query operator: {0}")]
    UnsupportedOperator(String),
    /// A recognized operator was given a malformed operand, e.g. a non-array
    /// `$in` operand or an invalid `$regex` pattern.
    #[error("Malformed query: {0}")]
    Query(String),
    /// A key- or query-targeted update matched no live record.
    /// The first argument describes the target, the second is the collection name.
    #[error("No record matched {0} in collection {1}")]
    NotFound(String, String),
    /// A record with the given key already exists in the collection.
    /// The first argument is the key, the second is the collection name.
    #[error("Record {0} already exists in collection {1}")]
    DuplicateKey(String, String),
    /// The requested collection does not exist in the store.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    /// An opaque failure forwarded unmodified from the underlying store.
    #[error("Store error: {0}")]
    Store(String),
    /// Serialization/deserialization error when converting between record
    /// formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// A specialized `Result` type for model-layer operations.
pub type KeyformResult<T> = Result<T, KeyformError>;

impl From<BsonError> for KeyformError {
    fn from(err: BsonError) -> Self {
        KeyformError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for KeyformError {
    fn from(err: SerdeJsonError) -> Self {
        KeyformError::Serialization(err.to_string())
    }
}
