//! Object store: upload, retrieval, and deletion of files by id.

use std::convert::Infallible;
use std::fmt::Display;
use std::pin::pin;
use std::sync::{Arc, PoisonError, RwLock};

use bytes::{Bytes, BytesMut};
use folio_shared::types::ObjectId;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt, TryStreamExt, stream};
use tracing::{debug, error, info, warn};

use super::chunked::{ChunkedStore, ObjectMetadata, StoredObject, UploadStream};
use super::error::{ChunkStoreError, ObjectStoreError};

/// Lazily read payload of one object.
///
/// Chunks arrive in write order. The stream cannot be restarted; open a new
/// one with [`ObjectStore::open`]. Dropping it stops reading.
pub type ObjectStream = BoxStream<'static, Result<Bytes, ObjectStoreError>>;

/// Route prefix files are served from.
const FILES_ROUTE: &str = "/api/files";

/// Orchestrates uploads, reads, and deletes against a [`ChunkedStore`].
///
/// The store starts unbound. Until [`initialize`](Self::initialize) is called,
/// every operation fails with [`ObjectStoreError::Uninitialized`] without
/// touching any backend.
#[derive(Default)]
pub struct ObjectStore {
    handle: RwLock<Option<Arc<dyn ChunkedStore>>>,
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("backend", &self.backend_name())
            .finish()
    }
}

impl ObjectStore {
    /// Create an unbound store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already bound to `store`.
    #[must_use]
    pub fn with_store(store: Arc<dyn ChunkedStore>) -> Self {
        let this = Self::new();
        this.initialize(store);
        this
    }

    /// Bind the store to a chunked store, replacing any previous binding.
    pub fn initialize(&self, store: Arc<dyn ChunkedStore>) {
        let backend = store.name();
        let mut handle = self.handle.write().unwrap_or_else(PoisonError::into_inner);
        if handle.replace(store).is_some() {
            info!(backend, "object store re-initialized");
        } else {
            info!(backend, "object store initialized");
        }
    }

    /// Whether [`initialize`](Self::initialize) has been called.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Name of the bound backend, if any.
    #[must_use]
    pub fn backend_name(&self) -> Option<&'static str> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|store| store.name())
    }

    fn store(&self) -> Result<Arc<dyn ChunkedStore>, ObjectStoreError> {
        self.handle
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ObjectStoreError::Uninitialized)
    }

    /// Store `payload` as a new object and return its id.
    ///
    /// The id is returned only after the chunked store has committed every
    /// byte. Uploading the same bytes twice yields two objects.
    ///
    /// # Errors
    ///
    /// - [`ObjectStoreError::Uninitialized`] if the store is unbound
    /// - [`ObjectStoreError::WriteFailed`] if the upload stream fails at any point
    pub async fn put(
        &self,
        filename: &str,
        payload: Bytes,
        metadata: ObjectMetadata,
    ) -> Result<ObjectId, ObjectStoreError> {
        let source = stream::once(async move { Ok::<_, Infallible>(payload) });
        self.put_stream(filename, source, metadata).await
    }

    /// Store a payload that arrives as a stream of chunks.
    ///
    /// If `source` yields an error (for example a client disconnecting
    /// mid-upload) the upload is aborted and nothing becomes visible. Dropping
    /// the returned future has the same effect on visibility.
    ///
    /// # Errors
    ///
    /// - [`ObjectStoreError::Uninitialized`] if the store is unbound
    /// - [`ObjectStoreError::WriteFailed`] if the source or the upload stream fails
    pub async fn put_stream<S, E>(
        &self,
        filename: &str,
        source: S,
        metadata: ObjectMetadata,
    ) -> Result<ObjectId, ObjectStoreError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Display + Send,
    {
        let store = self.store()?;

        let mut upload = store
            .open_upload(filename, &metadata)
            .await
            .map_err(|e| {
                error!(filename, error = %e, "failed to open upload stream");
                ObjectStoreError::write_failed(e.to_string())
            })?;

        let mut source = pin!(source);
        while let Some(next) = source.next().await {
            let chunk = match next {
                Ok(chunk) => chunk,
                Err(e) => {
                    error!(filename, error = %e, "upload source failed");
                    abort(upload, filename).await;
                    return Err(ObjectStoreError::write_failed(format!(
                        "upload source failed: {e}"
                    )));
                }
            };
            if chunk.is_empty() {
                continue;
            }
            if let Err(e) = upload.write(chunk).await {
                error!(filename, error = %e, "upload stream write failed");
                abort(upload, filename).await;
                return Err(ObjectStoreError::write_failed(e.to_string()));
            }
        }

        let object = upload.finish().await.map_err(|e| {
            error!(filename, error = %e, "upload stream failed to commit");
            ObjectStoreError::write_failed(e.to_string())
        })?;

        info!(
            id = %object.id,
            filename,
            length = object.length,
            content_type = %object.metadata.content_type,
            "object stored"
        );
        Ok(object.id)
    }

    /// Read the full payload of `id` into memory.
    ///
    /// The whole object is buffered before returning; use [`open`](Self::open)
    /// to consume large objects chunk by chunk.
    ///
    /// # Errors
    ///
    /// - [`ObjectStoreError::Uninitialized`] if the store is unbound
    /// - [`ObjectStoreError::NotFound`] if no object exists for `id`
    /// - [`ObjectStoreError::ReadFailed`] on any download stream error
    pub async fn get(&self, id: ObjectId) -> Result<Bytes, ObjectStoreError> {
        let mut chunks = self.open(id).await?;
        let mut payload = BytesMut::new();
        while let Some(chunk) = chunks.try_next().await? {
            payload.extend_from_slice(&chunk);
        }
        debug!(%id, length = payload.len(), "object read");
        Ok(payload.freeze())
    }

    /// Open a lazy read of `id`.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get) when the download cannot be opened;
    /// errors while streaming arrive as [`ObjectStoreError::ReadFailed`] items.
    pub async fn open(&self, id: ObjectId) -> Result<ObjectStream, ObjectStoreError> {
        let store = self.store()?;
        let chunks = store
            .open_download(id)
            .await
            .map_err(|e| read_error(id, e))?;

        Ok(chunks
            .map_err(move |e| {
                error!(%id, error = %e, "download stream failed");
                ObjectStoreError::read_failed(e.to_string())
            })
            .boxed())
    }

    /// Read the files document of `id`.
    ///
    /// # Errors
    ///
    /// Same kinds as [`get`](Self::get).
    pub async fn stat(&self, id: ObjectId) -> Result<StoredObject, ObjectStoreError> {
        let store = self.store()?;
        store.stat(id).await.map_err(|e| read_error(id, e))
    }

    /// Delete `id` and all of its chunks.
    ///
    /// Whether deleting an unknown id fails depends on the chunked store;
    /// both bundled stores treat it as success.
    ///
    /// # Errors
    ///
    /// - [`ObjectStoreError::Uninitialized`] if the store is unbound
    /// - [`ObjectStoreError::DeleteFailed`] if the chunked store reports an error
    pub async fn remove(&self, id: ObjectId) -> Result<(), ObjectStoreError> {
        let store = self.store()?;
        store.delete(id).await.map_err(|e| {
            error!(%id, error = %e, "failed to delete object");
            ObjectStoreError::delete_failed(e.to_string())
        })?;
        info!(%id, "object deleted");
        Ok(())
    }

    /// Retrieval path for `id`.
    #[must_use]
    pub fn url_for(id: ObjectId) -> String {
        format!("{FILES_ROUTE}/{id}")
    }

    /// Parse an identifier received from a caller.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError::InvalidIdentifier`] unless `input` is 24 hex
    /// characters.
    pub fn parse_id(input: &str) -> Result<ObjectId, ObjectStoreError> {
        input
            .parse()
            .map_err(|reason| ObjectStoreError::InvalidIdentifier {
                input: input.to_string(),
                reason,
            })
    }
}

async fn abort(upload: Box<dyn UploadStream>, filename: &str) {
    if let Err(e) = upload.abort().await {
        warn!(filename, error = %e, "failed to abort upload stream");
    }
}

fn read_error(id: ObjectId, err: ChunkStoreError) -> ObjectStoreError {
    if err.is_not_found() {
        debug!(%id, "object not found");
        ObjectStoreError::not_found(id)
    } else {
        error!(%id, error = %err, "failed to open download stream");
        ObjectStoreError::read_failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryChunkedStore, OpendalChunkedStore, StorageConfig, StorageProvider};
    use chrono::{TimeZone, Utc};
    use rand::RngCore;
    use rstest::rstest;
    use std::collections::HashSet;

    fn bound(chunk_size: usize) -> (ObjectStore, MemoryChunkedStore) {
        let backend = MemoryChunkedStore::with_chunk_size(chunk_size);
        let store = ObjectStore::with_store(Arc::new(backend.clone()));
        (store, backend)
    }

    fn meta(content_type: &str, size: usize) -> ObjectMetadata {
        ObjectMetadata::new(content_type, size as u64)
    }

    fn random_bytes(len: usize) -> Bytes {
        let mut buf = vec![0u8; len];
        rand::rng().fill_bytes(&mut buf);
        Bytes::from(buf)
    }

    #[tokio::test]
    async fn test_photo_scenario() {
        let (store, _) = bound(256);
        let payload = random_bytes(1024);
        let uploaded_at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let metadata = ObjectMetadata {
            content_type: "image/png".to_string(),
            size: 1024,
            uploaded_at,
        };

        let id = store
            .put("photo.png", payload.clone(), metadata.clone())
            .await
            .unwrap();
        assert_eq!(store.get(id).await.unwrap(), payload);

        let info = store.stat(id).await.unwrap();
        assert_eq!(info.filename, "photo.png");
        assert_eq!(info.length, 1024);
        assert_eq!(info.metadata, metadata);

        store.remove(id).await.unwrap();
        assert!(matches!(
            store.get(id).await,
            Err(ObjectStoreError::NotFound { id: missing }) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_empty_payload() {
        let (store, _) = bound(16);
        let id = store
            .put("a.txt", Bytes::new(), meta("text/plain", 0))
            .await
            .unwrap();
        assert!(store.get(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identical_payloads_get_distinct_ids() {
        let (store, backend) = bound(16);
        let payload = Bytes::from_static(b"same bytes");
        let first = store
            .put("dup.txt", payload.clone(), meta("text/plain", 10))
            .await
            .unwrap();
        let second = store
            .put("dup.txt", payload.clone(), meta("text/plain", 10))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(backend.len(), 2);
        assert_eq!(store.get(first).await.unwrap(), payload);
        assert_eq!(store.get(second).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let (store, _) = bound(16);
        let id = ObjectId::new();
        assert!(matches!(
            store.get(id).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.stat(id).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_uninitialized_never_contacts_backend() {
        let backend = MemoryChunkedStore::new();
        let store = ObjectStore::new();
        let id = ObjectId::new();

        assert!(!store.is_initialized());
        assert!(matches!(
            store.put("a", Bytes::from_static(b"x"), meta("text/plain", 1)).await,
            Err(ObjectStoreError::Uninitialized)
        ));
        assert!(matches!(store.get(id).await, Err(ObjectStoreError::Uninitialized)));
        assert!(matches!(store.open(id).await, Err(ObjectStoreError::Uninitialized)));
        assert!(matches!(store.stat(id).await, Err(ObjectStoreError::Uninitialized)));
        assert!(matches!(store.remove(id).await, Err(ObjectStoreError::Uninitialized)));
        assert_eq!(backend.calls(), 0);

        store.initialize(Arc::new(backend.clone()));
        assert!(store.is_initialized());
        assert_eq!(store.backend_name(), Some("memory"));
    }

    #[tokio::test]
    async fn test_reinitialize_switches_backend() {
        let (store, first) = bound(16);
        let id = store
            .put("a.txt", Bytes::from_static(b"a"), meta("text/plain", 1))
            .await
            .unwrap();

        let second = MemoryChunkedStore::new();
        store.initialize(Arc::new(second.clone()));

        assert!(matches!(
            store.get(id).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_returns_no_id() {
        let (store, backend) = bound(16);
        backend.fail_writes(true);

        let result = store
            .put("a.txt", Bytes::from_static(b"abc"), meta("text/plain", 3))
            .await;

        assert!(matches!(result, Err(ObjectStoreError::WriteFailed(_))));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_source_failure_aborts_upload() {
        let (store, backend) = bound(4);
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"abcd")),
            Err("client disconnected"),
            Ok(Bytes::from_static(b"efgh")),
        ]);

        let result = store
            .put_stream("a.bin", source, meta("application/octet-stream", 8))
            .await;

        let msg = match result {
            Err(ObjectStoreError::WriteFailed(msg)) => msg,
            other => panic!("expected WriteFailed, got {other:?}"),
        };
        assert!(msg.contains("client disconnected"));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_on_local_fs_removes_partial_chunks() {
        let root = std::env::temp_dir().join(format!("folio-disconnect-{}", ObjectId::new()));
        let config = StorageConfig::new(StorageProvider::local_fs(&root)).with_chunk_size(4);
        let store = ObjectStore::with_store(Arc::new(OpendalChunkedStore::from_config(config).unwrap()));
        let source = stream::iter(vec![Ok(Bytes::from_static(b"abcdefgh")), Err("disconnect")]);

        let result = store
            .put_stream("a.bin", source, meta("application/octet-stream", 8))
            .await;
        assert!(matches!(result, Err(ObjectStoreError::WriteFailed(_))));

        let leftovers = std::fs::read_dir(root.join("fs").join("chunks"))
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(leftovers, 0);

        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_put_stream_concatenates_chunks() {
        let (store, backend) = bound(3);
        let source = stream::iter(
            ["ab", "", "cde", "f"]
                .into_iter()
                .map(|s| Ok::<_, Infallible>(Bytes::from(s))),
        );

        let id = store
            .put_stream("s.txt", source, meta("text/plain", 6))
            .await
            .unwrap();

        assert_eq!(store.get(id).await.unwrap(), Bytes::from_static(b"abcdef"));
        assert_eq!(backend.chunk_count(id), Some(2));
    }

    #[tokio::test]
    async fn test_read_failure_mid_stream() {
        let (store, backend) = bound(2);
        let id = store
            .put("a.bin", Bytes::from_static(b"abcdef"), meta("application/octet-stream", 6))
            .await
            .unwrap();
        backend.fail_reads(true);

        assert!(matches!(
            store.get(id).await,
            Err(ObjectStoreError::ReadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_open_yields_chunks_in_order() {
        let (store, _) = bound(2);
        let id = store
            .put("a.bin", Bytes::from_static(b"abcdef"), meta("application/octet-stream", 6))
            .await
            .unwrap();

        let chunks: Vec<Bytes> = store.open(id).await.unwrap().try_collect().await.unwrap();
        assert_eq!(chunks, vec![
            Bytes::from_static(b"ab"),
            Bytes::from_static(b"cd"),
            Bytes::from_static(b"ef"),
        ]);
    }

    #[tokio::test]
    async fn test_delete_failure() {
        let (store, backend) = bound(16);
        let id = store
            .put("a.txt", Bytes::from_static(b"a"), meta("text/plain", 1))
            .await
            .unwrap();
        backend.fail_deletes(true);

        assert!(matches!(
            store.remove(id).await,
            Err(ObjectStoreError::DeleteFailed(_))
        ));
        assert_eq!(store.get(id).await.unwrap(), Bytes::from_static(b"a"));
    }

    #[tokio::test]
    async fn test_delete_of_unknown_id_with_bundled_stores() {
        let (memory, _) = bound(16);
        assert!(memory.remove(ObjectId::new()).await.is_ok());

        let opendal = OpendalChunkedStore::from_config(StorageConfig::new(StorageProvider::Memory))
            .unwrap();
        let store = ObjectStore::with_store(Arc::new(opendal));
        assert!(store.remove(ObjectId::new()).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_do_not_mix() {
        let (store, _) = bound(64);
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..32usize {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let payload = Bytes::from(vec![u8::try_from(i).unwrap(); 100 + i * 37]);
                let id = store
                    .put(&format!("f{i}.bin"), payload.clone(), meta("application/octet-stream", payload.len()))
                    .await
                    .unwrap();
                (id, payload)
            }));
        }

        let mut ids = HashSet::new();
        let mut uploads = Vec::new();
        for handle in handles {
            let (id, payload) = handle.await.unwrap();
            ids.insert(id);
            uploads.push((id, payload));
        }
        assert_eq!(ids.len(), 32);

        for (id, payload) in uploads {
            assert_eq!(store.get(id).await.unwrap(), payload);
        }
    }

    #[rstest]
    #[case("not-a-valid-id")]
    #[case("")]
    #[case("65a1f0c2e4b0a1b2c3d4e5f")]
    #[case("65a1f0c2e4b0a1b2c3d4e5f6a")]
    #[case("g5a1f0c2e4b0a1b2c3d4e5f6")]
    fn test_parse_id_rejects(#[case] input: &str) {
        assert!(matches!(
            ObjectStore::parse_id(input),
            Err(ObjectStoreError::InvalidIdentifier { .. })
        ));
    }

    #[test]
    fn test_url_for() {
        let id = ObjectStore::parse_id("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        assert_eq!(ObjectStore::url_for(id), "/api/files/65a1f0c2e4b0a1b2c3d4e5f6");
    }

    #[tokio::test]
    async fn test_opendal_backed_round_trip() {
        let config = StorageConfig::new(StorageProvider::Memory).with_chunk_size(5);
        let store = ObjectStore::with_store(Arc::new(OpendalChunkedStore::from_config(config).unwrap()));
        let payload = random_bytes(123);

        let id = store
            .put("r.bin", payload.clone(), meta("application/octet-stream", 123))
            .await
            .unwrap();
        assert_eq!(store.get(id).await.unwrap(), payload);
        assert_eq!(store.stat(id).await.unwrap().length, 123);

        store.remove(id).await.unwrap();
        assert!(matches!(
            store.get(id).await,
            Err(ObjectStoreError::NotFound { .. })
        ));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::storage::MemoryChunkedStore;
    use proptest::prelude::*;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
    }

    // Property: get(put(b)) == b for every payload, including the empty one,
    // whatever the chunk size.
    proptest! {
        #[test]
        fn prop_put_then_get_returns_payload(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            chunk_size in 1usize..512,
        ) {
            let store = ObjectStore::with_store(Arc::new(MemoryChunkedStore::with_chunk_size(chunk_size)));
            let expected = Bytes::from(payload);

            let got = runtime().block_on(async {
                let id = store
                    .put("p.bin", expected.clone(), ObjectMetadata::new("application/octet-stream", expected.len() as u64))
                    .await?;
                store.get(id).await
            });

            prop_assert_eq!(got.unwrap(), expected);
        }
    }

    // Property: a split upload reads back as the concatenation of its parts.
    proptest! {
        #[test]
        fn prop_stream_parts_concatenate(
            parts in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..64), 0..16),
        ) {
            let store = ObjectStore::with_store(Arc::new(MemoryChunkedStore::with_chunk_size(7)));
            let expected: Vec<u8> = parts.concat();
            let source = stream::iter(parts.into_iter().map(|p| Ok::<_, Infallible>(Bytes::from(p))));

            let got = runtime().block_on(async {
                let id = store
                    .put_stream("s.bin", source, ObjectMetadata::new("application/octet-stream", 0))
                    .await?;
                store.get(id).await
            });

            prop_assert_eq!(got.unwrap().to_vec(), expected);
        }
    }
}
