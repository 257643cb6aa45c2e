//! # folio-core: Versioned document model for Folio
//!
//! Stores wiki documents as current content plus a chain of line diffs, so
//! any past version can be rebuilt by reverse-patching from the present.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  apply_update   ┌──────────────┐   evict   ┌──────────────┐
//! │   Document   │ ──────────────► │ VersionStore │ ────────► │VersionArchive│
//! │ (immutable)  │ ◄────────────── │  (window 10) │ ◄──────── │ (doc, ver)   │
//! └──────────────┘  new Document   └──────┬───────┘ find_range└──────────────┘
//!                                         │
//!                                  ┌──────┴──────┐
//!                                  │    diff     │
//!                                  │ hash/patch  │
//!                                  └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`diff`]: SHA-256 hashing, unified diffs, forward/reverse patching
//! - [`document`]: `Document`, `VersionDelta`, `ArchivedVersion`
//! - [`version`]: `VersionStore`: windowed history and reconstruction
//! - [`archive`]: `VersionArchive` trait and the in-memory archive
//! - [`error`]: error types

pub mod archive;
pub mod diff;
pub mod document;
pub mod error;
pub mod version;

// Re-exports for convenience
pub use archive::{MemoryArchive, VersionArchive};
pub use diff::ChangeStats;
pub use document::{
    now_millis, ArchivedVersion, Document, UserId, VersionDelta, VersionSummary,
};
pub use error::{ArchiveError, PatchError, VersionError};
pub use version::{UpdateOutcome, VersionConfig, VersionStore};
