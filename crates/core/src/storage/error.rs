//! Storage error types.

use folio_shared::types::{IdError, ObjectId};
use thiserror::Error;

/// Errors surfaced by [`ObjectStore`](super::ObjectStore) operations.
///
/// Every failure reaches the caller in one of these kinds; nothing is retried
/// or swallowed.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// The store has not been bound to a chunked store yet.
    #[error("object store is not initialized")]
    Uninitialized,

    /// The upload stream failed before the object was committed.
    #[error("upload failed: {0}")]
    WriteFailed(String),

    /// The download stream failed.
    #[error("download failed: {0}")]
    ReadFailed(String),

    /// No object exists for the identifier.
    #[error("object not found: {id}")]
    NotFound {
        /// Identifier that was looked up.
        id: ObjectId,
    },

    /// The chunked store reported an error while deleting.
    #[error("delete failed: {0}")]
    DeleteFailed(String),

    /// The identifier is not a 24-character hex token.
    #[error("invalid identifier '{input}': {reason}")]
    InvalidIdentifier {
        /// The rejected text.
        input: String,
        /// Why it was rejected.
        reason: IdError,
    },
}

impl ObjectStoreError {
    /// Create a write failure.
    #[must_use]
    pub fn write_failed(msg: impl Into<String>) -> Self {
        Self::WriteFailed(msg.into())
    }

    /// Create a read failure.
    #[must_use]
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create a not found error.
    #[must_use]
    pub fn not_found(id: ObjectId) -> Self {
        Self::NotFound { id }
    }

    /// Create a delete failure.
    #[must_use]
    pub fn delete_failed(msg: impl Into<String>) -> Self {
        Self::DeleteFailed(msg.into())
    }
}

/// Errors reported by a [`ChunkedStore`](super::ChunkedStore) backend.
#[derive(Debug, Error)]
pub enum ChunkStoreError {
    /// No committed object under this key.
    #[error("file not found: {key}")]
    NotFound {
        /// Storage key that was not found.
        key: String,
    },

    /// Storage provider configuration error.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// Files document could not be encoded or decoded.
    #[error("files document serialization failed: {0}")]
    Serialization(String),

    /// The backend failed the operation.
    #[error("storage operation failed: {0}")]
    Backend(String),
}

impl ChunkStoreError {
    /// Create a not found error.
    #[must_use]
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a configuration error.
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a backend error.
    #[must_use]
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Whether this error means the object does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<opendal::Error> for ChunkStoreError {
    fn from(err: opendal::Error) -> Self {
        match err.kind() {
            opendal::ErrorKind::NotFound => Self::NotFound {
                key: err.to_string(),
            },
            opendal::ErrorKind::ConfigInvalid => Self::Configuration(err.to_string()),
            _ => Self::Backend(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChunkStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
