//! The chunked store abstraction the object store is built on.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use folio_shared::types::ObjectId;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use super::error::ChunkStoreError;

/// Caller-supplied metadata recorded alongside an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// MIME type reported by the uploader.
    pub content_type: String,
    /// Size in bytes reported by the uploader.
    pub size: u64,
    /// When the caller received the upload.
    pub uploaded_at: DateTime<Utc>,
}

impl ObjectMetadata {
    /// Metadata stamped with the current time.
    #[must_use]
    pub fn new(content_type: impl Into<String>, size: u64) -> Self {
        Self {
            content_type: content_type.into(),
            size,
            uploaded_at: Utc::now(),
        }
    }
}

/// Files document for a committed object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    /// Object identifier.
    pub id: ObjectId,
    /// Original filename. Metadata only, never used for lookup.
    pub filename: String,
    /// Bytes actually written, recorded at commit.
    pub length: u64,
    /// Chunk size the payload was written with.
    pub chunk_size: usize,
    /// When the store committed the object.
    pub upload_date: DateTime<Utc>,
    /// Caller-supplied metadata.
    pub metadata: ObjectMetadata,
}

/// Lazily produced payload chunks, in write order.
pub type DownloadStream = BoxStream<'static, Result<Bytes, ChunkStoreError>>;

/// An open upload into a chunked store.
///
/// Nothing written through an upload stream is visible to readers until
/// [`finish`](UploadStream::finish) returns successfully.
#[async_trait]
pub trait UploadStream: Send {
    /// Append bytes to the payload.
    async fn write(&mut self, chunk: Bytes) -> Result<(), ChunkStoreError>;

    /// Flush remaining chunks and commit the files document.
    async fn finish(self: Box<Self>) -> Result<StoredObject, ChunkStoreError>;

    /// Stop the upload and discard whatever was written.
    async fn abort(self: Box<Self>) -> Result<(), ChunkStoreError>;
}

/// Storage engine that splits payloads into chunks and reassembles them.
///
/// Implementations must:
/// - assign a fresh id per upload, never reusing one (no deduplication)
/// - make an object visible only once its upload is committed
/// - yield chunks on download in the order they were written
#[async_trait]
pub trait ChunkedStore: Send + Sync {
    /// Short backend name, used in logs and the health report.
    fn name(&self) -> &'static str;

    /// Open an upload stream for a new object.
    async fn open_upload(
        &self,
        filename: &str,
        metadata: &ObjectMetadata,
    ) -> Result<Box<dyn UploadStream>, ChunkStoreError>;

    /// Open a download stream for a committed object.
    ///
    /// Fails with [`ChunkStoreError::NotFound`] if `id` was never committed.
    async fn open_download(&self, id: ObjectId) -> Result<DownloadStream, ChunkStoreError>;

    /// Read the files document of a committed object.
    async fn stat(&self, id: ObjectId) -> Result<StoredObject, ChunkStoreError>;

    /// Remove an object's files document and all of its chunks.
    async fn delete(&self, id: ObjectId) -> Result<(), ChunkStoreError>;
}
