//! Persistent storage for documents and archived versions.
//!
//! Architecture:
//! ```text
//! ┌────────────────┐   save/load    ┌──────────────────────────────────────┐
//! │ DocumentService│ ─────────────► │ DocumentStore (RocksDB)              │
//! └───────┬────────┘                │  CF "documents"     doc → Document   │
//!         │ apply_update            │  CF "archive"       doc:ver → delta  │
//!         ▼                         │  CF "project_index" project:doc → () │
//! ┌────────────────┐   persist      └──────────────────────────────────────┘
//! │ VersionStore   │ ─────────────► (same store, as VersionArchive)
//! └────────────────┘
//! ```
//!
//! [`MemoryDocumentRepository`] is the in-process counterpart used by tests
//! and embedded setups; pair it with `folio_core::MemoryArchive`.
//!
//! Reference: Kleppmann, Designing Data-Intensive Applications, Chapter 3

pub mod memory;
pub mod rocks;

pub use memory::MemoryDocumentRepository;
pub use rocks::{DocumentStore, StoreConfig};

use folio_core::{ArchiveError, Document};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Document not found: {0}")]
    NotFound(Uuid),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Deserialization error: {0}")]
    DeserializationError(String),
    #[error("Compression error: {0}")]
    CompressionError(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::DatabaseError(e.to_string())
    }
}

impl From<StoreError> for ArchiveError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::SerializationError(msg)
            | StoreError::DeserializationError(msg)
            | StoreError::CompressionError(msg) => ArchiveError::Codec(msg),
            other => ArchiveError::Backend(other.to_string()),
        }
    }
}

/// Row-level persistence for documents.
pub trait DocumentRepository: Send + Sync {
    fn load(&self, id: Uuid) -> Result<Option<Document>, StoreError>;

    /// Insert or replace the document row.
    fn save(&self, document: &Document) -> Result<(), StoreError>;

    /// Returns whether a row existed.
    fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Documents of a project, in no particular order.
    fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Document>, StoreError>;
}
