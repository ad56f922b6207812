//! Error types and result types for document store operations.
//!
//! Every fallible operation in the workspace returns [`DocumentStoreResult<T>`].
//! Engine errors are raised before anything is committed, so a call that fails
//! leaves the collection exactly as it was.

use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The criteria object is malformed, or an operator was given an operand it cannot use.
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),
    /// The projection mixes inclusion and exclusion, or carries a non-flag value.
    #[error("Invalid projection: {0}")]
    InvalidProjection(String),
    /// The update specification uses an operator the applier does not know.
    #[error("Unsupported update operator: {0}")]
    UnsupportedOperator(String),
    /// An update operator met a value of the wrong type (e.g. `$inc` on a string).
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    /// A document with the given identifier already exists in the collection.
    #[error("Document {0} already exists")]
    DuplicateId(String),
    /// The document has an invalid structure or tries to change its identifier.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Serialization/deserialization error when reading or writing documents.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Durable storage could not be read or written.
    #[error("I/O error: {0}")]
    Io(String),
    /// Error during adapter or storage initialization (bad settings, unknown adapter).
    #[error("Initialization error: {0}")]
    Initialization(String),
    /// An error occurred in a persistence adapter.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<IoError> for DocumentStoreError {
    fn from(err: IoError) -> Self {
        DocumentStoreError::Io(err.to_string())
    }
}
