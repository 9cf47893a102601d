//! File storage over a chunked object store.
//!
//! [`ObjectStore`] owns the lifecycle of uploaded files: it streams payloads
//! into a [`ChunkedStore`], hands back an [`ObjectId`] once the store has
//! committed the object, and serves reads and deletes by that id. The chunked
//! store itself is an injected dependency:
//!
//! - [`OpendalChunkedStore`] - Apache OpenDAL (S3-compatible, Azure Blob, local
//!   filesystem, memory)
//! - [`MemoryChunkedStore`] - in-process fake with failure injection for tests
//!
//! # Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         ObjectStore                          │
//! │   put / put_stream / get / open / stat / remove / url_for    │
//! ├──────────────────────────────────────────────────────────────┤
//! │                 ChunkedStore (Arc<dyn ...>)                  │
//! │  open_upload → UploadStream { write, finish, abort }         │
//! │  open_download → Stream<Bytes>    stat    delete             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`ObjectId`]: folio_shared::types::ObjectId

mod chunked;
mod config;
mod error;
mod memory;
mod opendal_store;
mod service;

pub use chunked::{ChunkedStore, DownloadStream, ObjectMetadata, StoredObject, UploadStream};
pub use config::{StorageConfig, StorageProvider};
pub use error::{ChunkStoreError, ObjectStoreError};
pub use memory::MemoryChunkedStore;
pub use opendal_store::OpendalChunkedStore;
pub use service::{ObjectStore, ObjectStream};
