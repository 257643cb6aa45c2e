//! Long-term storage for deltas evicted from a document's window.
//!
//! The archive is a dumb keyed store: entries are written once by eviction,
//! read back in version order during reconstruction, and dropped only in bulk
//! when a document or a whole project goes away.
//!
//! ```text
//! Document window            Archive
//! [v3 v4 ... v12]  ──evict──► (doc, v2) (doc, v1?) ...
//!       ▲                         │
//!       └──── reverse-patch ◄─────┘  find_range(doc, target, floor - 1]
//! ```

use std::collections::BTreeMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::document::ArchivedVersion;
use crate::error::ArchiveError;

/// Persistence for archived version deltas.
///
/// Implementations hold no business logic. Range and listing queries return
/// entries sorted by ascending version.
pub trait VersionArchive: Send + Sync {
    /// Store an evicted delta. Writing the same (document, version) twice
    /// overwrites the earlier entry.
    fn persist(&self, entry: &ArchivedVersion) -> Result<(), ArchiveError>;

    /// Entries with `from_exclusive < version <= to_inclusive`.
    fn find_range(
        &self,
        document_id: Uuid,
        from_exclusive: u32,
        to_inclusive: u32,
    ) -> Result<Vec<ArchivedVersion>, ArchiveError>;

    /// Every archived entry of a document.
    fn find_all(&self, document_id: Uuid) -> Result<Vec<ArchivedVersion>, ArchiveError>;

    /// Remove all entries of a document, returning how many were removed.
    fn delete_all_for_document(&self, document_id: Uuid) -> Result<u64, ArchiveError>;

    /// Remove all entries belonging to a project.
    fn delete_all_for_project(&self, project_id: Uuid) -> Result<u64, ArchiveError>;

    /// Number of archived entries in a project.
    fn count_for_project(&self, project_id: Uuid) -> Result<u64, ArchiveError>;
}

/// In-process archive backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: RwLock<BTreeMap<(Uuid, u32), ArchivedVersion>>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total entries across all documents.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<(Uuid, u32), ArchivedVersion>>, ArchiveError>
    {
        self.entries
            .read()
            .map_err(|_| ArchiveError::Backend("archive lock poisoned".to_string()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<(Uuid, u32), ArchivedVersion>>, ArchiveError>
    {
        self.entries
            .write()
            .map_err(|_| ArchiveError::Backend("archive lock poisoned".to_string()))
    }
}

impl VersionArchive for MemoryArchive {
    fn persist(&self, entry: &ArchivedVersion) -> Result<(), ArchiveError> {
        self.write()?
            .insert((entry.document_id, entry.version()), entry.clone());
        Ok(())
    }

    fn find_range(
        &self,
        document_id: Uuid,
        from_exclusive: u32,
        to_inclusive: u32,
    ) -> Result<Vec<ArchivedVersion>, ArchiveError> {
        if from_exclusive >= to_inclusive {
            return Ok(Vec::new());
        }
        let entries = self.read()?;
        Ok(entries
            .range((document_id, from_exclusive + 1)..=(document_id, to_inclusive))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn find_all(&self, document_id: Uuid) -> Result<Vec<ArchivedVersion>, ArchiveError> {
        let entries = self.read()?;
        Ok(entries
            .range((document_id, 0)..=(document_id, u32::MAX))
            .map(|(_, v)| v.clone())
            .collect())
    }

    fn delete_all_for_document(&self, document_id: Uuid) -> Result<u64, ArchiveError> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|(doc, _), _| *doc != document_id);
        Ok((before - entries.len()) as u64)
    }

    fn delete_all_for_project(&self, project_id: Uuid) -> Result<u64, ArchiveError> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, v| v.project_id != project_id);
        Ok((before - entries.len()) as u64)
    }

    fn count_for_project(&self, project_id: Uuid) -> Result<u64, ArchiveError> {
        let entries = self.read()?;
        Ok(entries.values().filter(|v| v.project_id == project_id).count() as u64)
    }
}
