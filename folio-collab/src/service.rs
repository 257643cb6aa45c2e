//! Document service: the single entry point for hosts.
//!
//! ```text
//!            ┌──────────────────── DocumentService ────────────────────┐
//!  write ──► │ load ─► [lock check] ─► VersionStore ─► save            │
//!            │                             │                           │
//!            │                             └─► VersionArchive (evict)  │
//!  read  ──► │ load ─► VersionStore::reconstruct / history             │
//!  presence ►│ PresenceRegistry / LockManager  (TTL store, no rows)    │
//!            └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Versioning errors always reach the caller. Presence and lock calls are
//! advisory and degrade to `false` / empty instead of failing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use folio_core::{
    ArchiveError, Document, MemoryArchive, UpdateOutcome, UserId, VersionArchive, VersionDelta,
    VersionError, VersionStore, VersionSummary,
};

use crate::config::{ServiceConfig, WritePolicy};
use crate::kv::{KvError, LockStore, MemoryTtlStore, PresenceStore};
use crate::lock::LockManager;
use crate::presence::{CursorPosition, EditorInfo, PresenceRegistry};
use crate::storage::{DocumentRepository, DocumentStore, MemoryDocumentRepository, StoreError};
use crate::users::UserDirectory;

/// Errors returned by [`DocumentService`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),
    #[error(transparent)]
    Version(#[from] VersionError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("User {editor_id} does not hold the content lock on {document_id} (owner: {owner:?})")]
    NotLockHolder {
        document_id: Uuid,
        editor_id: UserId,
        owner: Option<UserId>,
    },
    #[error("Content lock could not be checked: {0}")]
    LockUnavailable(#[from] KvError),
}

/// Input for [`DocumentService::create_document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub project_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_by: UserId,
}

impl NewDocument {
    pub fn new(
        project_id: Uuid,
        title: impl Into<String>,
        content: impl Into<String>,
        created_by: UserId,
    ) -> Self {
        Self {
            project_id,
            title: title.into(),
            content: content.into(),
            created_by,
        }
    }
}

/// Service counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStats {
    pub documents_created: u64,
    pub versions_recorded: u64,
    pub unchanged_updates: u64,
    pub versions_archived: u64,
}

#[derive(Default)]
struct Counters {
    documents_created: AtomicU64,
    versions_recorded: AtomicU64,
    unchanged_updates: AtomicU64,
    versions_archived: AtomicU64,
}

/// Orchestrates document rows, version history, presence and locks.
pub struct DocumentService {
    repository: Arc<dyn DocumentRepository>,
    archive: Arc<dyn VersionArchive>,
    versions: VersionStore,
    presence: PresenceRegistry,
    locks: LockManager,
    config: ServiceConfig,
    counters: Counters,
}

impl DocumentService {
    pub fn new(
        repository: Arc<dyn DocumentRepository>,
        archive: Arc<dyn VersionArchive>,
        presence_store: Arc<dyn PresenceStore>,
        lock_store: Arc<dyn LockStore>,
        directory: Arc<dyn UserDirectory>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            versions: VersionStore::new(archive.clone(), config.version.clone()),
            presence: PresenceRegistry::new(presence_store, directory, config.collab.clone()),
            locks: LockManager::new(lock_store, config.collab.clone()),
            repository,
            archive,
            config,
            counters: Counters::default(),
        }
    }

    /// Everything in process memory.
    pub fn in_memory(directory: Arc<dyn UserDirectory>, config: ServiceConfig) -> Self {
        let ttl_store = Arc::new(MemoryTtlStore::new());
        Self::new(
            Arc::new(MemoryDocumentRepository::new()),
            Arc::new(MemoryArchive::new()),
            ttl_store.clone(),
            ttl_store,
            directory,
            config,
        )
    }

    /// Documents and archive in RocksDB, presence and locks in `ttl_store`.
    pub fn with_document_store(
        store: Arc<DocumentStore>,
        ttl_store: Arc<MemoryTtlStore>,
        directory: Arc<dyn UserDirectory>,
        config: ServiceConfig,
    ) -> Self {
        Self::new(
            store.clone(),
            store,
            ttl_store.clone(),
            ttl_store,
            directory,
            config,
        )
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            documents_created: self.counters.documents_created.load(Ordering::Relaxed),
            versions_recorded: self.counters.versions_recorded.load(Ordering::Relaxed),
            unchanged_updates: self.counters.unchanged_updates.load(Ordering::Relaxed),
            versions_archived: self.counters.versions_archived.load(Ordering::Relaxed),
        }
    }

    // ─── Documents & versions ─────────────────────────────────────────

    /// Create and persist a document at version 1.
    pub async fn create_document(&self, new: NewDocument) -> Result<Document, ServiceError> {
        let document = self
            .versions
            .create(new.project_id, new.title, new.content, new.created_by);
        self.repository.save(&document)?;
        self.counters.documents_created.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "Created document {} in project {} by user {}",
            document.id,
            document.project_id,
            document.created_by
        );
        Ok(document)
    }

    /// Record new content for a document.
    ///
    /// Identical content is a no-op and returns the stored document. Under
    /// [`WritePolicy::LockThenWrite`] the editor must hold the content lock.
    pub async fn update_document_content(
        &self,
        document_id: Uuid,
        content: &str,
        change_description: Option<&str>,
        editor_id: UserId,
    ) -> Result<Document, ServiceError> {
        let current = self.load(document_id)?;

        if self.config.write_policy == WritePolicy::LockThenWrite {
            let owner = self.locks.holder(document_id).await?;
            if owner != Some(editor_id) {
                return Err(ServiceError::NotLockHolder {
                    document_id,
                    editor_id,
                    owner,
                });
            }
        }

        match self
            .versions
            .apply_update(&current, content, change_description, editor_id)?
        {
            UpdateOutcome::Unchanged => {
                self.counters.unchanged_updates.fetch_add(1, Ordering::Relaxed);
                Ok(current)
            }
            UpdateOutcome::Versioned {
                document,
                delta,
                archived,
            } => {
                if let Err(e) = self.repository.save(&document) {
                    log::error!(
                        "Failed to persist version {} of document {}: {}",
                        delta.version,
                        document_id,
                        e
                    );
                    return Err(e.into());
                }
                self.counters.versions_recorded.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .versions_archived
                    .fetch_add(archived.len() as u64, Ordering::Relaxed);
                log::info!(
                    "Document {} updated to version {} by user {} ({})",
                    document_id,
                    delta.version,
                    editor_id,
                    delta.stats()
                );
                Ok(document)
            }
        }
    }

    pub async fn get_document(&self, document_id: Uuid) -> Result<Document, ServiceError> {
        self.load(document_id)
    }

    /// Content of `document_id` as of `version`.
    pub async fn version_content(&self, document_id: Uuid, version: u32) -> Result<String, ServiceError> {
        let document = self.load(document_id)?;
        Ok(self.versions.reconstruct_version(&document, version)?)
    }

    /// Unified diff from `v1` to `v2`.
    pub async fn compare_versions(
        &self,
        document_id: Uuid,
        v1: u32,
        v2: u32,
    ) -> Result<String, ServiceError> {
        let document = self.load(document_id)?;
        Ok(self.versions.compare_versions(&document, v1, v2)?)
    }

    /// Every recorded version, newest first.
    pub async fn version_history(&self, document_id: Uuid) -> Result<Vec<VersionSummary>, ServiceError> {
        let document = self.load(document_id)?;
        Ok(self.versions.history(&document)?)
    }

    /// Deltas still held on the document row, oldest first.
    pub async fn recent_versions(&self, document_id: Uuid) -> Result<Vec<VersionDelta>, ServiceError> {
        let document = self.load(document_id)?;
        Ok(self.versions.recent_versions(&document).to_vec())
    }

    /// Drop the archived history of a document. The row and its window stay.
    pub async fn delete_version_history(&self, document_id: Uuid) -> Result<u64, ServiceError> {
        let removed = self.archive.delete_all_for_document(document_id)?;
        log::info!(
            "Deleted {} archived versions of document {}",
            removed,
            document_id
        );
        Ok(removed)
    }

    /// Drop the archived history of every document in a project.
    pub async fn delete_version_history_for_project(&self, project_id: Uuid) -> Result<u64, ServiceError> {
        let removed = self.archive.delete_all_for_project(project_id)?;
        log::info!(
            "Deleted {} archived versions in project {}",
            removed,
            project_id
        );
        Ok(removed)
    }

    /// Number of archived versions across a project.
    pub async fn archived_version_count(&self, project_id: Uuid) -> Result<u64, ServiceError> {
        Ok(self.archive.count_for_project(project_id)?)
    }

    /// Delete a document row and its archive. Returns whether the row existed.
    pub async fn delete_document(&self, document_id: Uuid) -> Result<bool, ServiceError> {
        let archived = self.archive.delete_all_for_document(document_id)?;
        let existed = self.repository.delete(document_id)?;
        if existed {
            log::info!(
                "Deleted document {} ({} archived versions)",
                document_id,
                archived
            );
        }
        Ok(existed)
    }

    pub async fn documents_for_project(&self, project_id: Uuid) -> Result<Vec<Document>, ServiceError> {
        Ok(self.repository.list_for_project(project_id)?)
    }

    // ─── Collaboration ────────────────────────────────────────────────

    pub async fn join_editing(&self, document_id: Uuid, user_id: UserId) -> bool {
        self.presence.join_editing(document_id, user_id).await
    }

    pub async fn leave_editing(&self, user_id: UserId) -> bool {
        self.presence.leave_editing(user_id).await
    }

    pub async fn heartbeat(&self, document_id: Uuid, user_id: UserId) -> bool {
        self.presence.refresh_editing_status(document_id, user_id).await
    }

    pub async fn is_editing(&self, user_id: UserId, document_id: Uuid) -> bool {
        self.presence.is_user_editing(user_id, document_id).await
    }

    pub async fn update_cursor(&self, user_id: UserId, position: CursorPosition) -> bool {
        self.presence.update_cursor_position(user_id, position).await
    }

    pub async fn online_editors(&self, document_id: Uuid) -> Vec<EditorInfo> {
        self.presence.online_editors(document_id).await
    }

    pub async fn cursors(&self, document_id: Uuid) -> Vec<CursorPosition> {
        self.presence.editor_cursors(document_id).await
    }

    pub async fn editor_count(&self, document_id: Uuid) -> usize {
        self.presence.editor_count(document_id).await
    }

    pub async fn try_lock(&self, user_id: UserId, document_id: Uuid) -> bool {
        self.locks.try_lock_content(user_id, document_id).await
    }

    pub async fn release_lock(&self, document_id: Uuid, user_id: UserId) -> bool {
        self.locks.release_lock(document_id, user_id).await
    }

    pub async fn lock_owner(&self, document_id: Uuid) -> Option<UserId> {
        self.locks.lock_owner(document_id).await
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    fn load(&self, document_id: Uuid) -> Result<Document, ServiceError> {
        self.repository
            .load(document_id)?
            .ok_or(ServiceError::DocumentNotFound(document_id))
    }
}
