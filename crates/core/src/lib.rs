//! Core logic for Folio.
//!
//! This crate contains the file storage subsystem with ZERO web dependencies.
//!
//! # Modules
//!
//! - `storage` - Upload, retrieval, and deletion of binary objects over a chunked store

pub mod storage;
