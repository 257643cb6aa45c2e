//! # folio-collab: Collaborative editing services for Folio
//!
//! Wraps the versioned document model from `folio-core` with persistence,
//! editor presence, cursors and advisory content locks.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────┐
//!                    │ DocumentService │
//!                    └───┬─────┬────┬──┘
//!         ┌──────────────┘     │    └───────────────┐
//!         ▼                    ▼                    ▼
//! ┌───────────────┐   ┌─────────────────┐   ┌──────────────┐
//! │ VersionStore  │   │PresenceRegistry │   │ LockManager  │
//! │ (folio-core)  │   │ + UserDirectory │   │              │
//! └───┬───────┬───┘   └────────┬────────┘   └──────┬───────┘
//!     │       │                └─────────┬─────────┘
//!     ▼       ▼                          ▼
//! Document  VersionArchive      PresenceStore / LockStore
//! Repository  (RocksDB or memory)   (TTL key space)
//! ```
//!
//! ## Modules
//!
//! - [`service`]: `DocumentService`, the host-facing API
//! - [`presence`]: editor sets, cursors, online editors
//! - [`lock`]: per-document content locks
//! - [`kv`]: TTL store traits and the in-memory store
//! - [`storage`]: RocksDB and in-memory document persistence
//! - [`users`]: user directory for display names
//! - [`config`]: configuration structs
//!
//! ## Performance Targets
//!
//! | Metric | Target |
//! |--------|--------|
//! | Update 10KB document | <1ms |
//! | Reconstruct 50 versions back | <5ms |
//! | Cursor fan-in, 50 editors | <2ms |

pub mod config;
pub mod kv;
pub mod lock;
pub mod presence;
pub mod service;
pub mod storage;
pub mod users;

// Re-exports for convenience
pub use config::{CollabConfig, ServiceConfig, WritePolicy};
pub use kv::{KvError, LockStore, MemoryTtlStore, PresenceStore};
pub use lock::LockManager;
pub use presence::{cursor_color, CursorPosition, EditorInfo, PresenceRegistry};
pub use service::{DocumentService, NewDocument, ServiceError, ServiceStats};
pub use storage::{
    DocumentRepository, DocumentStore, MemoryDocumentRepository, StoreConfig, StoreError,
};
pub use users::{DirectoryError, StaticUserDirectory, UserDirectory, UserProfile};
