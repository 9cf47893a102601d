//! Storage configuration types.

use folio_shared::config::StorageSettings;

pub use folio_shared::config::StorageProvider;

/// Chunked store configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage provider configuration.
    pub provider: StorageProvider,
    /// Size in bytes of the chunks payloads are written and read in.
    pub chunk_size: usize,
    /// Key prefix for files documents and chunks.
    pub prefix: String,
}

impl StorageConfig {
    /// Default chunk size: 255 KiB.
    pub const DEFAULT_CHUNK_SIZE: usize = 255 * 1024;
    /// Default key prefix.
    pub const DEFAULT_PREFIX: &'static str = "fs";

    /// Create a new storage config with default settings.
    #[must_use]
    pub fn new(provider: StorageProvider) -> Self {
        Self {
            provider,
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            prefix: Self::DEFAULT_PREFIX.to_string(),
        }
    }

    /// Set chunk size.
    #[must_use]
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }

    /// Set key prefix. Leading and trailing slashes are dropped.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into().trim_matches('/').to_string();
        self
    }

    /// Key of the files document for `id`.
    #[must_use]
    pub fn files_key(&self, id: impl std::fmt::Display) -> String {
        self.key("files", &format!("{id}.json"))
    }

    /// Key of the chunked payload for `id`.
    #[must_use]
    pub fn chunks_key(&self, id: impl std::fmt::Display) -> String {
        self.key("chunks", &id.to_string())
    }

    fn key(&self, collection: &str, name: &str) -> String {
        if self.prefix.is_empty() {
            format!("{collection}/{name}")
        } else {
            format!("{}/{collection}/{name}", self.prefix)
        }
    }
}

impl From<StorageSettings> for StorageConfig {
    fn from(settings: StorageSettings) -> Self {
        Self::new(settings.provider)
            .with_chunk_size(settings.chunk_size)
            .with_prefix(settings.prefix)
    }
}
