//! Chunked store backed by Apache OpenDAL.
//!
//! Each object occupies two keys under the configured prefix:
//!
//! - `{prefix}/chunks/{id}` holds the payload, written through OpenDAL's
//!   chunked writer (multipart uploads on S3 and Azure) and read back with a
//!   chunked reader.
//! - `{prefix}/files/{id}.json` holds the [`StoredObject`] document. It is
//!   written only after the payload closes, so its presence is the commit
//!   marker: an object whose files document is missing does not exist.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use folio_shared::types::ObjectId;
use futures::{StreamExt, TryStreamExt};
use opendal::{Operator, Writer, services};
use tracing::{debug, warn};

use super::chunked::{ChunkedStore, DownloadStream, ObjectMetadata, StoredObject, UploadStream};
use super::config::{StorageConfig, StorageProvider};
use super::error::ChunkStoreError;

/// Chunked store over an OpenDAL [`Operator`].
#[derive(Debug, Clone)]
pub struct OpendalChunkedStore {
    operator: Operator,
    config: StorageConfig,
}

impl OpendalChunkedStore {
    /// Create a store from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage provider cannot be initialized or the
    /// chunk size is zero.
    pub fn from_config(config: StorageConfig) -> Result<Self, ChunkStoreError> {
        let operator = Self::create_operator(&config.provider)?;
        Self::new(operator, config)
    }

    /// Create a store over an existing operator.
    ///
    /// # Errors
    ///
    /// Returns an error if the chunk size is zero.
    pub fn new(operator: Operator, config: StorageConfig) -> Result<Self, ChunkStoreError> {
        if config.chunk_size == 0 {
            return Err(ChunkStoreError::configuration("chunk_size must be positive"));
        }
        Ok(Self { operator, config })
    }

    /// Create OpenDAL operator from provider config.
    fn create_operator(provider: &StorageProvider) -> Result<Operator, ChunkStoreError> {
        let invalid = |e: opendal::Error| ChunkStoreError::configuration(e.to_string());

        let operator = match provider {
            StorageProvider::S3 {
                endpoint,
                bucket,
                access_key_id,
                secret_access_key,
                region,
            } => {
                let builder = services::S3::default()
                    .endpoint(endpoint)
                    .bucket(bucket)
                    .access_key_id(access_key_id)
                    .secret_access_key(secret_access_key)
                    .region(region);
                Operator::new(builder).map_err(invalid)?.finish()
            }
            StorageProvider::AzureBlob {
                account,
                access_key,
                container,
            } => {
                let builder = services::Azblob::default()
                    .account_name(account)
                    .account_key(access_key)
                    .container(container);
                Operator::new(builder).map_err(invalid)?.finish()
            }
            StorageProvider::LocalFs { root } => {
                let root = root
                    .to_str()
                    .ok_or_else(|| ChunkStoreError::configuration("invalid path"))?;
                Operator::new(services::Fs::default().root(root))
                    .map_err(invalid)?
                    .finish()
            }
            StorageProvider::Memory => Operator::new(services::Memory::default())
                .map_err(invalid)?
                .finish(),
        };

        Ok(operator)
    }
}

#[async_trait]
impl ChunkedStore for OpendalChunkedStore {
    fn name(&self) -> &'static str {
        self.config.provider.name()
    }

    async fn open_upload(
        &self,
        filename: &str,
        metadata: &ObjectMetadata,
    ) -> Result<Box<dyn UploadStream>, ChunkStoreError> {
        let id = ObjectId::new();
        let chunks_key = self.config.chunks_key(id);
        let writer = self
            .operator
            .writer_with(&chunks_key)
            .chunk(self.config.chunk_size)
            .await?;

        debug!(%id, key = %chunks_key, "upload stream opened");

        Ok(Box::new(OpendalUpload {
            id,
            filename: filename.to_string(),
            metadata: metadata.clone(),
            written: 0,
            writer,
            operator: self.operator.clone(),
            chunks_key,
            files_key: self.config.files_key(id),
            chunk_size: self.config.chunk_size,
        }))
    }

    async fn open_download(&self, id: ObjectId) -> Result<DownloadStream, ChunkStoreError> {
        self.stat(id).await?;

        let reader = self
            .operator
            .reader_with(&self.config.chunks_key(id))
            .chunk(self.config.chunk_size)
            .await?;
        let stream = reader.into_bytes_stream(..).await?;

        Ok(stream
            .map_err(|e| ChunkStoreError::backend(e.to_string()))
            .boxed())
    }

    async fn stat(&self, id: ObjectId) -> Result<StoredObject, ChunkStoreError> {
        let files_key = self.config.files_key(id);
        let buffer = match self.operator.read(&files_key).await {
            Ok(buffer) => buffer,
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                return Err(ChunkStoreError::not_found(files_key));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&buffer.to_vec())?)
    }

    async fn delete(&self, id: ObjectId) -> Result<(), ChunkStoreError> {
        // Files document first: once it is gone the object is invisible, even
        // if removing the chunks fails below.
        self.operator.delete(&self.config.files_key(id)).await?;
        self.operator.delete(&self.config.chunks_key(id)).await?;
        Ok(())
    }
}

struct OpendalUpload {
    id: ObjectId,
    filename: String,
    metadata: ObjectMetadata,
    written: u64,
    writer: Writer,
    operator: Operator,
    chunks_key: String,
    files_key: String,
    chunk_size: usize,
}

#[async_trait]
impl UploadStream for OpendalUpload {
    async fn write(&mut self, chunk: Bytes) -> Result<(), ChunkStoreError> {
        let len = u64::try_from(chunk.len()).unwrap_or(u64::MAX);
        self.writer.write(chunk).await?;
        self.written += len;
        Ok(())
    }

    async fn finish(mut self: Box<Self>) -> Result<StoredObject, ChunkStoreError> {
        self.writer.close().await?;

        let object = StoredObject {
            id: self.id,
            filename: std::mem::take(&mut self.filename),
            length: self.written,
            chunk_size: self.chunk_size,
            upload_date: Utc::now(),
            metadata: self.metadata.clone(),
        };
        let document = serde_json::to_vec(&object)?;

        if let Err(e) = self.operator.write(&self.files_key, document).await {
            if let Err(cleanup) = self.operator.delete(&self.chunks_key).await {
                warn!(id = %self.id, error = %cleanup, "failed to remove uncommitted chunks");
            }
            return Err(e.into());
        }

        Ok(object)
    }

    async fn abort(mut self: Box<Self>) -> Result<(), ChunkStoreError> {
        // Not every service can abort a writer (fs without an atomic write
        // dir), and some keep what was written. Deleting the key settles both.
        if let Err(e) = self.writer.abort().await {
            debug!(id = %self.id, error = %e, "writer abort not supported");
        }
        if let Err(e) = self.operator.delete(&self.chunks_key).await {
            warn!(id = %self.id, error = %e, "failed to remove aborted chunks");
            return Err(e.into());
        }
        debug!(id = %self.id, "upload stream aborted");
        Ok(())
    }
}
