//! In-memory chunked store.
//!
//! Intended for tests and embedding. Committed objects live in a [`DashMap`]
//! keyed by id, each holding its payload as a list of chunks. Failure
//! switches make the upload, download and delete paths error on demand, and a
//! call counter records how often the store was contacted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::Utc;
use dashmap::DashMap;
use folio_shared::types::ObjectId;
use futures::{StreamExt, stream};

use super::chunked::{ChunkedStore, DownloadStream, ObjectMetadata, StoredObject, UploadStream};
use super::config::StorageConfig;
use super::error::ChunkStoreError;

#[derive(Debug)]
struct MemoryObject {
    info: StoredObject,
    chunks: Vec<Bytes>,
}

#[derive(Debug, Default)]
struct Inner {
    objects: DashMap<ObjectId, MemoryObject>,
    calls: AtomicUsize,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    fail_deletes: AtomicBool,
}

/// Chunked store held entirely in process memory.
#[derive(Debug, Clone)]
pub struct MemoryChunkedStore {
    inner: Arc<Inner>,
    chunk_size: usize,
}

impl MemoryChunkedStore {
    /// Create an empty store with the default chunk size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(StorageConfig::DEFAULT_CHUNK_SIZE)
    }

    /// Create an empty store that splits payloads into `chunk_size` pieces.
    ///
    /// A zero chunk size is treated as one byte.
    #[must_use]
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of committed objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.objects.len()
    }

    /// Returns `true` if no object is committed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.objects.is_empty()
    }

    /// Number of chunks the payload of `id` is split into, if committed.
    #[must_use]
    pub fn chunk_count(&self, id: ObjectId) -> Option<usize> {
        self.inner.objects.get(&id).map(|object| object.chunks.len())
    }

    /// How many trait operations have reached this store.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Make every upload write fail.
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make downloads error after their first chunk.
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make deletes fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.inner.fail_deletes.store(fail, Ordering::SeqCst);
    }

    fn record_call(&self) {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for MemoryChunkedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkedStore for MemoryChunkedStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn open_upload(
        &self,
        filename: &str,
        metadata: &ObjectMetadata,
    ) -> Result<Box<dyn UploadStream>, ChunkStoreError> {
        self.record_call();
        Ok(Box::new(MemoryUpload {
            inner: Arc::clone(&self.inner),
            id: ObjectId::new(),
            filename: filename.to_string(),
            metadata: metadata.clone(),
            chunk_size: self.chunk_size,
            buffer: BytesMut::new(),
            chunks: Vec::new(),
        }))
    }

    async fn open_download(&self, id: ObjectId) -> Result<DownloadStream, ChunkStoreError> {
        self.record_call();
        let chunks = self
            .inner
            .objects
            .get(&id)
            .map(|object| object.chunks.clone())
            .ok_or_else(|| ChunkStoreError::not_found(id.to_string()))?;

        if self.inner.fail_reads.load(Ordering::SeqCst) {
            let head = chunks.into_iter().take(1).map(Ok);
            let failure = stream::once(async {
                Err(ChunkStoreError::backend("injected read failure"))
            });
            return Ok(stream::iter(head).chain(failure).boxed());
        }

        Ok(stream::iter(chunks.into_iter().map(Ok)).boxed())
    }

    async fn stat(&self, id: ObjectId) -> Result<StoredObject, ChunkStoreError> {
        self.record_call();
        self.inner
            .objects
            .get(&id)
            .map(|object| object.info.clone())
            .ok_or_else(|| ChunkStoreError::not_found(id.to_string()))
    }

    async fn delete(&self, id: ObjectId) -> Result<(), ChunkStoreError> {
        self.record_call();
        if self.inner.fail_deletes.load(Ordering::SeqCst) {
            return Err(ChunkStoreError::backend("injected delete failure"));
        }
        // Unknown ids are not an error, matching OpenDAL's delete.
        self.inner.objects.remove(&id);
        Ok(())
    }
}

struct MemoryUpload {
    inner: Arc<Inner>,
    id: ObjectId,
    filename: String,
    metadata: ObjectMetadata,
    chunk_size: usize,
    buffer: BytesMut,
    chunks: Vec<Bytes>,
}

impl MemoryUpload {
    fn seal_full_chunks(&mut self) {
        while self.buffer.len() >= self.chunk_size {
            self.chunks.push(self.buffer.split_to(self.chunk_size).freeze());
        }
    }
}

#[async_trait]
impl UploadStream for MemoryUpload {
    async fn write(&mut self, chunk: Bytes) -> Result<(), ChunkStoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(ChunkStoreError::backend("injected write failure"));
        }
        self.buffer.extend_from_slice(&chunk);
        self.seal_full_chunks();
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<StoredObject, ChunkStoreError> {
        if self.inner.fail_writes.load(Ordering::SeqCst) {
            return Err(ChunkStoreError::backend("injected write failure"));
        }
        if !self.buffer.is_empty() {
            let tail = self.buffer.split().freeze();
            self.chunks.push(tail);
        }

        let length = self.chunks.iter().map(|chunk| chunk.len() as u64).sum();
        let info = StoredObject {
            id: self.id,
            filename: std::mem::take(&mut self.filename),
            length,
            chunk_size: self.chunk_size,
            upload_date: Utc::now(),
            metadata: self.metadata.clone(),
        };

        self.inner.objects.insert(
            self.id,
            MemoryObject {
                info: info.clone(),
                chunks: std::mem::take(&mut self.chunks),
            },
        );
        Ok(info)
    }

    async fn abort(self: Box<Self>) -> Result<(), ChunkStoreError> {
        Ok(())
    }
}
