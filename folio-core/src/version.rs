//! Windowed version history with reverse-patch reconstruction.
//!
//! Each edit stores a unified diff (old → new) rather than a full copy. The
//! newest deltas stay inline on the document; once the window overflows the
//! oldest delta moves to the [`VersionArchive`].
//!
//! ```text
//!   v1 ──δ2──► v2 ──δ3──► ... ──δ12──► v12 (current content)
//!              │                        │
//!   archive ◄──┘    window: δ3 .. δ12 ──┘
//!
//!   reconstruct(v8):  v12 ─rev δ12─► v11 ─rev δ11─► ... ─rev δ9─► v8
//! ```
//!
//! Reconstruction never skips a step: every reverse application lowers the
//! version by exactly one, and the content hash is checked before each step.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::archive::VersionArchive;
use crate::diff;
use crate::document::{
    now_millis, summarize, ArchivedVersion, Document, UserId, VersionDelta, VersionSummary,
};
use crate::error::VersionError;

/// Version store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionConfig {
    /// Maximum number of deltas kept inline on a document
    pub window_size: usize,
    /// Length of `Document::content_summary` in characters
    pub summary_chars: usize,
    /// Used when an update carries no description
    pub default_change_description: String,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            summary_chars: 200,
            default_change_description: "Update content".to_string(),
        }
    }
}

impl VersionConfig {
    /// Small window so tests reach the archive quickly.
    pub fn for_testing() -> Self {
        Self {
            window_size: 3,
            ..Self::default()
        }
    }
}

/// Result of [`VersionStore::apply_update`].
#[derive(Debug, Clone)]
pub enum UpdateOutcome {
    /// New content hashes equal to the current content; nothing recorded.
    Unchanged,
    /// A new version was recorded.
    Versioned {
        document: Document,
        delta: VersionDelta,
        /// Versions moved to the archive by this update.
        archived: Vec<u32>,
    },
}

impl UpdateOutcome {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, UpdateOutcome::Unchanged)
    }

    /// The updated document, or `None` for a no-op.
    pub fn into_document(self) -> Option<Document> {
        match self {
            UpdateOutcome::Unchanged => None,
            UpdateOutcome::Versioned { document, .. } => Some(document),
        }
    }
}

/// Versioning logic over an injected archive.
#[derive(Clone)]
pub struct VersionStore {
    archive: Arc<dyn VersionArchive>,
    config: VersionConfig,
}

impl VersionStore {
    pub fn new(archive: Arc<dyn VersionArchive>, config: VersionConfig) -> Self {
        Self { archive, config }
    }

    pub fn config(&self) -> &VersionConfig {
        &self.config
    }

    pub fn archive(&self) -> &Arc<dyn VersionArchive> {
        &self.archive
    }

    /// Create a fresh document at version 1.
    pub fn create(
        &self,
        project_id: uuid::Uuid,
        title: impl Into<String>,
        content: impl Into<String>,
        creator: UserId,
    ) -> Document {
        Document::new(project_id, title, content, creator, self.config.summary_chars)
    }

    /// Record `new_content` as the next version of `doc`.
    ///
    /// The input document is left untouched; on success the caller receives a
    /// new value to persist. Deltas pushed out of the window are written to
    /// the archive first, and an archive failure aborts the update.
    pub fn apply_update(
        &self,
        doc: &Document,
        new_content: &str,
        change_description: Option<&str>,
        editor_id: UserId,
    ) -> Result<UpdateOutcome, VersionError> {
        let new_hash = diff::content_hash(new_content);
        if new_hash == doc.content_hash {
            log::debug!(
                "Update of document {} by {} leaves content unchanged",
                doc.id,
                editor_id
            );
            return Ok(UpdateOutcome::Unchanged);
        }

        let content_diff = diff::calculate_diff(&doc.content, new_content);
        let stats = diff::calculate_stats(&doc.content, new_content);
        let description = change_description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(self.config.default_change_description.as_str())
            .to_string();
        let now = now_millis();

        let delta = VersionDelta {
            version: doc.current_version + 1,
            content_diff,
            change_description: description,
            editor_id,
            created_at: now,
            added_lines: stats.added_lines,
            deleted_lines: stats.deleted_lines,
            changed_chars: stats.changed_chars,
            content_hash: new_hash.clone(),
        };

        let mut window = doc.recent_versions.clone();
        window.push(delta.clone());

        let overflow = window.len().saturating_sub(self.config.window_size);
        let mut archived = Vec::with_capacity(overflow);
        for evicted in window.drain(..overflow) {
            let version = evicted.version;
            let entry = ArchivedVersion::new(doc.id, doc.project_id, evicted);
            if let Err(e) = self.archive.persist(&entry) {
                log::error!(
                    "Failed to archive version {} of document {}: {}",
                    version,
                    doc.id,
                    e
                );
                return Err(e.into());
            }
            log::info!("Archived version {} of document {}", version, doc.id);
            archived.push(version);
        }

        let document = Document {
            content: new_content.to_string(),
            content_hash: new_hash,
            content_size: new_content.chars().count() as u64,
            content_summary: summarize(new_content, self.config.summary_chars),
            current_version: delta.version,
            recent_versions: window,
            updated_by: editor_id,
            updated_at: now,
            ..doc.clone()
        };

        log::debug!(
            "Document {} now at version {} ({})",
            document.id,
            document.current_version,
            stats
        );

        Ok(UpdateOutcome::Versioned {
            document,
            delta,
            archived,
        })
    }

    /// Rebuild the content of `doc` as of `target`.
    pub fn reconstruct_version(&self, doc: &Document, target: u32) -> Result<String, VersionError> {
        if target == doc.current_version {
            return Ok(doc.content.clone());
        }
        if target == 0 || target > doc.current_version {
            return Err(VersionError::VersionNotFound {
                requested: target,
                current: doc.current_version,
            });
        }

        let mut content = doc.content.clone();
        let mut cursor = doc.current_version;

        for delta in doc.recent_versions.iter().rev() {
            if cursor == target {
                return Ok(content);
            }
            if delta.version != cursor {
                return Err(VersionError::BrokenChain {
                    document_id: doc.id,
                    expected: cursor,
                    found: delta.version,
                });
            }
            content = step_back(&content, delta)?;
            cursor -= 1;
        }

        if cursor == target {
            return Ok(content);
        }

        // Remaining steps come from the archive, newest first.
        let archived = self.archive.find_range(doc.id, target, cursor)?;
        let mut entries = archived.into_iter().rev();
        while cursor > target {
            match entries.next() {
                Some(entry) if entry.version() == cursor => {
                    content = step_back(&content, &entry.delta)?;
                    cursor -= 1;
                }
                Some(entry) if entry.version() > cursor => {
                    return Err(VersionError::BrokenChain {
                        document_id: doc.id,
                        expected: cursor,
                        found: entry.version(),
                    });
                }
                _ => {
                    return Err(VersionError::MissingArchivedVersion {
                        document_id: doc.id,
                        version: cursor,
                    });
                }
            }
        }

        Ok(content)
    }

    /// Fresh diff between two historical versions.
    pub fn compare_versions(&self, doc: &Document, v1: u32, v2: u32) -> Result<String, VersionError> {
        let old = self.reconstruct_version(doc, v1)?;
        let new = self.reconstruct_version(doc, v2)?;
        Ok(diff::calculate_diff(&old, &new))
    }

    /// Full history, newest first, with archived entries flagged.
    pub fn history(&self, doc: &Document) -> Result<Vec<VersionSummary>, VersionError> {
        let mut merged: BTreeMap<u32, VersionSummary> = BTreeMap::new();
        for entry in self.archive.find_all(doc.id)? {
            merged.insert(entry.version(), VersionSummary::from_delta(&entry.delta, true));
        }
        // A delta present in both places was archived by an update that was
        // never persisted; the window copy is authoritative.
        for delta in &doc.recent_versions {
            merged.insert(delta.version, VersionSummary::from_delta(delta, false));
        }
        Ok(merged.into_values().rev().collect())
    }

    /// Deltas still held inline, oldest first.
    pub fn recent_versions<'a>(&self, doc: &'a Document) -> &'a [VersionDelta] {
        &doc.recent_versions
    }
}

fn step_back(content: &str, delta: &VersionDelta) -> Result<String, VersionError> {
    if !diff::verify_hash(content, &delta.content_hash) {
        return Err(VersionError::CorruptDelta {
            version: delta.version,
            reason: "content hash does not match delta".to_string(),
        });
    }
    diff::reverse_patch(content, &delta.content_diff).map_err(|e| VersionError::CorruptDelta {
        version: delta.version,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::error::ArchiveError;
    use uuid::Uuid;

    fn store(config: VersionConfig) -> (VersionStore, Arc<MemoryArchive>) {
        let archive = Arc::new(MemoryArchive::new());
        (VersionStore::new(archive.clone(), config), archive)
    }

    fn edit(store: &VersionStore, doc: &Document, content: &str) -> Document {
        store
            .apply_update(doc, content, None, 1)
            .unwrap()
            .into_document()
            .expect("content changed")
    }

    struct FailingArchive;

    impl VersionArchive for FailingArchive {
        fn persist(&self, _: &ArchivedVersion) -> Result<(), ArchiveError> {
            Err(ArchiveError::Backend("offline".into()))
        }
        fn find_range(&self, _: Uuid, _: u32, _: u32) -> Result<Vec<ArchivedVersion>, ArchiveError> {
            Err(ArchiveError::Backend("offline".into()))
        }
        fn find_all(&self, _: Uuid) -> Result<Vec<ArchivedVersion>, ArchiveError> {
            Err(ArchiveError::Backend("offline".into()))
        }
        fn delete_all_for_document(&self, _: Uuid) -> Result<u64, ArchiveError> {
            Err(ArchiveError::Backend("offline".into()))
        }
        fn delete_all_for_project(&self, _: Uuid) -> Result<u64, ArchiveError> {
            Err(ArchiveError::Backend("offline".into()))
        }
        fn count_for_project(&self, _: Uuid) -> Result<u64, ArchiveError> {
            Err(ArchiveError::Backend("offline".into()))
        }
    }

    #[test]
    fn test_hello_world_update() {
        let (store, _) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "Greeting", "Hello", 7);

        let outcome = store.apply_update(&doc, "Hello World", None, 7).unwrap();
        let UpdateOutcome::Versioned { document, delta, archived } = outcome else {
            panic!("expected a new version");
        };

        assert_eq!(document.current_version, 2);
        assert_eq!(document.content, "Hello World");
        assert_eq!(document.updated_by, 7);
        assert_eq!(delta.version, 2);
        assert_eq!(delta.changed_chars, 6);
        assert_eq!(delta.change_description, "Update content");
        assert!(archived.is_empty());
        assert_eq!(store.reconstruct_version(&document, 1).unwrap(), "Hello");

        // Input value untouched
        assert_eq!(doc.current_version, 1);
        assert_eq!(doc.content, "Hello");
    }

    #[test]
    fn test_identical_update_is_noop() {
        let (store, archive) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "same", 1);
        let outcome = store.apply_update(&doc, "same", Some("nothing"), 2).unwrap();
        assert!(outcome.is_unchanged());
        assert!(archive.is_empty());
    }

    #[test]
    fn test_blank_description_uses_default() {
        let (store, _) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "a", 1);
        let outcome = store.apply_update(&doc, "b", Some("   "), 1).unwrap();
        let UpdateOutcome::Versioned { delta, .. } = outcome else {
            panic!("expected a new version");
        };
        assert_eq!(delta.change_description, "Update content");

        let outcome = store.apply_update(&doc, "b", Some("Fix typo"), 1).unwrap();
        let UpdateOutcome::Versioned { delta, .. } = outcome else {
            panic!("expected a new version");
        };
        assert_eq!(delta.change_description, "Fix typo");
    }

    #[test]
    fn test_window_overflow_moves_oldest_to_archive() {
        let (store, archive) = store(VersionConfig::for_testing());
        let mut doc = store.create(Uuid::new_v4(), "t", "v1", 1);
        for i in 2..=4 {
            doc = edit(&store, &doc, &format!("v{i}"));
        }
        assert_eq!(doc.recent_versions.len(), 3);
        assert!(archive.is_empty());

        let outcome = store.apply_update(&doc, "v5", None, 1).unwrap();
        let UpdateOutcome::Versioned { document, archived, .. } = outcome else {
            panic!("expected a new version");
        };
        assert_eq!(archived, vec![2]);
        assert_eq!(document.window_floor(), Some(3));
        assert_eq!(document.recent_versions.len(), 3);
        assert_eq!(archive.find_all(document.id).unwrap()[0].version(), 2);
        assert!(document.verify_integrity().is_ok());
    }

    #[test]
    fn test_archive_failure_aborts_update() {
        let store = VersionStore::new(Arc::new(FailingArchive), VersionConfig::for_testing());
        let mut doc = store.create(Uuid::new_v4(), "t", "v1", 1);
        for i in 2..=4 {
            doc = edit(&store, &doc, &format!("v{i}"));
        }

        let result = store.apply_update(&doc, "v5", None, 1);
        assert!(matches!(result, Err(VersionError::Archive(_))));
        assert_eq!(doc.current_version, 4);
    }

    #[test]
    fn test_reconstruct_out_of_range() {
        let (store, _) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "a", 1);
        let doc = edit(&store, &doc, "b");

        assert!(matches!(
            store.reconstruct_version(&doc, 0),
            Err(VersionError::VersionNotFound { requested: 0, current: 2 })
        ));
        assert!(matches!(
            store.reconstruct_version(&doc, 3),
            Err(VersionError::VersionNotFound { requested: 3, current: 2 })
        ));
        assert_eq!(store.reconstruct_version(&doc, 2).unwrap(), "b");
    }

    #[test]
    fn test_reconstruct_detects_corrupt_delta() {
        let (store, _) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "one\ntwo", 1);
        let mut doc = edit(&store, &doc, "one\nthree");
        doc.recent_versions[0].content_diff = "@@ -1,1 +1,1 @@\n-nope\n+also nope".into();

        assert!(matches!(
            store.reconstruct_version(&doc, 1),
            Err(VersionError::CorruptDelta { version: 2, .. })
        ));
    }

    #[test]
    fn test_reconstruct_rejects_delta_with_overflowing_hunk() {
        let (store, _) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "x", 1);
        let mut doc = edit(&store, &doc, "x\ny");
        doc.recent_versions[0].content_diff = format!("@@ -1,1 +{},2 @@\n x\n+y", usize::MAX);

        assert!(matches!(
            store.reconstruct_version(&doc, 1),
            Err(VersionError::CorruptDelta { version: 2, .. })
        ));
    }

    #[test]
    fn test_reconstruct_detects_hash_mismatch() {
        let (store, _) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "a", 1);
        let mut doc = edit(&store, &doc, "b");
        doc.content = "c".into();

        assert!(matches!(
            store.reconstruct_version(&doc, 1),
            Err(VersionError::CorruptDelta { version: 2, .. })
        ));
    }

    #[test]
    fn test_reconstruct_detects_broken_window() {
        let (store, _) = store(VersionConfig::default());
        let mut doc = store.create(Uuid::new_v4(), "t", "a", 1);
        for c in ["b", "c", "d"] {
            doc = edit(&store, &doc, c);
        }
        doc.recent_versions.remove(1);

        assert!(matches!(
            store.reconstruct_version(&doc, 1),
            Err(VersionError::BrokenChain { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn test_reconstruct_reports_missing_archive_entry() {
        let (store, archive) = store(VersionConfig::for_testing());
        let mut doc = store.create(Uuid::new_v4(), "t", "v1", 1);
        for i in 2..=7 {
            doc = edit(&store, &doc, &format!("v{i}"));
        }
        assert_eq!(doc.window_floor(), Some(5));
        archive.delete_all_for_document(doc.id).unwrap();

        assert_eq!(store.reconstruct_version(&doc, 4).unwrap(), "v4");
        assert!(matches!(
            store.reconstruct_version(&doc, 3),
            Err(VersionError::MissingArchivedVersion { version: 4, .. })
        ));
    }

    #[test]
    fn test_compare_versions_diffs_reconstructed_content() {
        let (store, _) = store(VersionConfig::default());
        let mut doc = store.create(Uuid::new_v4(), "t", "alpha", 1);
        for c in ["alpha\nbeta", "alpha\nbeta\ngamma"] {
            doc = edit(&store, &doc, c);
        }

        let patch = store.compare_versions(&doc, 1, 3).unwrap();
        assert_eq!(diff::apply_patch("alpha", &patch).unwrap(), "alpha\nbeta\ngamma");
        assert!(store.compare_versions(&doc, 2, 2).unwrap().is_empty());
    }

    #[test]
    fn test_history_merges_window_and_archive() {
        let (store, _) = store(VersionConfig::for_testing());
        let mut doc = store.create(Uuid::new_v4(), "t", "v1", 1);
        for i in 2..=6 {
            doc = edit(&store, &doc, &format!("v{i}"));
        }

        let history = store.history(&doc).unwrap();
        let versions: Vec<(u32, bool)> = history.iter().map(|h| (h.version, h.archived)).collect();
        assert_eq!(
            versions,
            vec![(6, false), (5, false), (4, false), (3, true), (2, true)]
        );
        assert_eq!(store.recent_versions(&doc).len(), 3);
    }

    #[test]
    fn test_history_prefers_window_copy() {
        let (store, archive) = store(VersionConfig::default());
        let doc = store.create(Uuid::new_v4(), "t", "a", 1);
        let doc = edit(&store, &doc, "b");
        let orphan = ArchivedVersion::new(doc.id, doc.project_id, doc.recent_versions[0].clone());
        archive.persist(&orphan).unwrap();

        let history = store.history(&doc).unwrap();
        assert_eq!(history.len(), 1);
        assert!(!history[0].archived);
    }
}
