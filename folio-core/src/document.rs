//! Document and version-delta model.
//!
//! A [`Document`] is an immutable value: the current content plus a bounded
//! window of the most recent [`VersionDelta`]s, oldest first. Edits produce a
//! new `Document` (see [`VersionStore`](crate::version::VersionStore)); older
//! deltas leave the window as [`ArchivedVersion`]s.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::diff::{self, ChangeStats};
use crate::error::VersionError;

/// Platform user identifier.
pub type UserId = u64;

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// First `max_chars` characters of `content`.
pub fn summarize(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

/// One recorded content change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionDelta {
    /// Version this delta produced.
    pub version: u32,
    /// Unified diff from version - 1 to version.
    pub content_diff: String,
    pub change_description: String,
    pub editor_id: UserId,
    /// Creation time (unix ms)
    pub created_at: u64,
    pub added_lines: u32,
    pub deleted_lines: u32,
    pub changed_chars: u32,
    /// Hash of the full content at `version`.
    pub content_hash: String,
}

impl VersionDelta {
    pub fn stats(&self) -> ChangeStats {
        ChangeStats {
            added_lines: self.added_lines,
            deleted_lines: self.deleted_lines,
            changed_chars: self.changed_chars,
        }
    }
}

/// A delta evicted from a document's window into the archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedVersion {
    pub document_id: Uuid,
    /// Kept on every entry so a whole project can be purged in one pass.
    pub project_id: Uuid,
    pub delta: VersionDelta,
    /// Eviction time (unix ms)
    pub archived_at: u64,
}

impl ArchivedVersion {
    pub fn new(document_id: Uuid, project_id: Uuid, delta: VersionDelta) -> Self {
        Self {
            document_id,
            project_id,
            delta,
            archived_at: now_millis(),
        }
    }

    pub fn version(&self) -> u32 {
        self.delta.version
    }
}

/// A history entry as shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub version: u32,
    pub change_description: String,
    pub editor_id: UserId,
    pub created_at: u64,
    pub added_lines: u32,
    pub deleted_lines: u32,
    pub changed_chars: u32,
    /// Whether the delta lives in the archive rather than the window.
    pub archived: bool,
}

impl VersionSummary {
    pub fn from_delta(delta: &VersionDelta, archived: bool) -> Self {
        Self {
            version: delta.version,
            change_description: delta.change_description.clone(),
            editor_id: delta.editor_id,
            created_at: delta.created_at,
            added_lines: delta.added_lines,
            deleted_lines: delta.deleted_lines,
            changed_chars: delta.changed_chars,
            archived,
        }
    }
}

/// A wiki document with its current content and recent history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub project_id: Uuid,
    pub title: String,
    pub content: String,
    pub content_hash: String,
    /// Length of `content` in characters
    pub content_size: u64,
    pub content_summary: String,
    pub current_version: u32,
    /// Most recent deltas, oldest first.
    pub recent_versions: Vec<VersionDelta>,
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Document {
    /// Create a document at version 1 with no deltas.
    pub fn new(
        project_id: Uuid,
        title: impl Into<String>,
        content: impl Into<String>,
        creator: UserId,
        summary_chars: usize,
    ) -> Self {
        let content = content.into();
        let now = now_millis();
        Self {
            id: Uuid::new_v4(),
            project_id,
            title: title.into(),
            content_hash: diff::content_hash(&content),
            content_size: content.chars().count() as u64,
            content_summary: summarize(&content, summary_chars),
            content,
            current_version: 1,
            recent_versions: Vec::new(),
            created_by: creator,
            updated_by: creator,
            created_at: now,
            updated_at: now,
        }
    }

    /// Lowest version still held inline, if any.
    pub fn window_floor(&self) -> Option<u32> {
        self.recent_versions.first().map(|d| d.version)
    }

    /// Look up a delta in the window.
    pub fn recent_delta(&self, version: u32) -> Option<&VersionDelta> {
        self.recent_versions.iter().find(|d| d.version == version)
    }

    /// Check the stored hash and the shape of the window.
    ///
    /// The window must be contiguous and end at `current_version`; an empty
    /// window is only valid for an unedited document or when every delta has
    /// been archived.
    pub fn verify_integrity(&self) -> Result<(), VersionError> {
        if !diff::verify_hash(&self.content, &self.content_hash) {
            return Err(VersionError::CorruptDelta {
                version: self.current_version,
                reason: "stored content hash does not match content".to_string(),
            });
        }

        let mut expected = self.current_version;
        for delta in self.recent_versions.iter().rev() {
            if delta.version != expected {
                return Err(VersionError::BrokenChain {
                    document_id: self.id,
                    expected,
                    found: delta.version,
                });
            }
            expected = expected.saturating_sub(1);
        }

        if let Some(newest) = self.recent_versions.last() {
            if newest.content_hash != self.content_hash {
                return Err(VersionError::CorruptDelta {
                    version: newest.version,
                    reason: "newest delta hash does not match document".to_string(),
                });
            }
        }
        Ok(())
    }
}
