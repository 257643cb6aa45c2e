//! Editor presence and cursor tracking.
//!
//! Tracks who is editing which document and where their cursor is. All state
//! lives in a shared [`PresenceStore`] with TTLs; a client that stops sending
//! heartbeats simply ages out.
//!
//! ## Architecture
//!
//! ```text
//! join_editing(doc, user)
//!       │
//!       ├──► folio:editing:<doc>        += user   (TTL 300s, per member)
//!       └──► folio:user-editing:<user>  =  doc    (TTL 300s)
//!
//! update_cursor_position(user, pos)
//!       └──► folio:cursor:<doc>:<user>  =  pos    (TTL 60s)
//!
//! editor_cursors(doc)
//!       members ──► join_all(get cursor) ──► drop stale (>5 min) ──► sort
//! ```
//!
//! Every store call runs under the configured deadline. A failed or slow
//! call is logged and reads as `false`, an empty list or zero; presence is
//! advisory and never blocks editing.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use folio_core::{now_millis, UserId};

use crate::config::CollabConfig;
use crate::kv::{cursor_key, editing_key, user_editing_key, within, KvError, PresenceStore};
use crate::users::UserDirectory;

// ───────────────────────────────────────────────────────────────────
// Core types
// ───────────────────────────────────────────────────────────────────

/// A user's caret and selection inside a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub user_id: UserId,
    pub document_id: Uuid,
    /// Zero-based line
    pub line: u32,
    /// Zero-based column
    pub column: u32,
    pub selection_start: Option<u32>,
    pub selection_end: Option<u32>,
    /// Block the cursor sits in, for editors that address paragraphs
    pub paragraph_id: Option<String>,
    /// Last update (unix ms), stamped by the registry
    pub last_update: u64,
}

impl CursorPosition {
    pub fn new(user_id: UserId, document_id: Uuid, line: u32, column: u32) -> Self {
        Self {
            user_id,
            document_id,
            line,
            column,
            selection_start: None,
            selection_end: None,
            paragraph_id: None,
            last_update: 0,
        }
    }

    pub fn with_selection(mut self, start: u32, end: u32) -> Self {
        self.selection_start = Some(start);
        self.selection_end = Some(end);
        self
    }

    pub fn with_paragraph(mut self, paragraph_id: impl Into<String>) -> Self {
        self.paragraph_id = Some(paragraph_id.into());
        self
    }

    /// Whether the last update is older than `staleness_ms` at `now_ms`.
    pub fn is_stale(&self, now_ms: u64, staleness_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_update) > staleness_ms
    }

    /// Encode to binary (bincode).
    pub fn encode(&self) -> Result<Vec<u8>, KvError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| KvError::Codec(e.to_string()))
    }

    /// Decode from binary.
    pub fn decode(bytes: &[u8]) -> Result<Self, KvError> {
        let (cursor, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| KvError::Codec(e.to_string()))?;
        Ok(cursor)
    }
}

/// An online editor as shown next to a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorInfo {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
    /// Stable `#rrggbb` color for this user's cursor
    pub color: String,
}

/// Stable, visually distinct cursor color for a user.
///
/// Hue comes from the user id; saturation and lightness are fixed so every
/// cursor stays readable on a light background.
pub fn cursor_color(user_id: UserId) -> String {
    // Golden-ratio stepping spreads consecutive ids around the wheel
    let hue = (user_id as f64 * 0.618_033_988_75).fract() as f32;
    let (r, g, b) = hsl_to_rgb(hue, 0.7, 0.5);
    format!(
        "#{:02x}{:02x}{:02x}",
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8
    )
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> (f32, f32, f32) {
    if s == 0.0 {
        return (l, l, l);
    }
    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    (
        hue_to_rgb(p, q, h + 1.0 / 3.0),
        hue_to_rgb(p, q, h),
        hue_to_rgb(p, q, h - 1.0 / 3.0),
    )
}

fn hue_to_rgb(p: f32, q: f32, mut t: f32) -> f32 {
    if t < 0.0 {
        t += 1.0;
    }
    if t > 1.0 {
        t -= 1.0;
    }
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * (2.0 / 3.0 - t) * 6.0
    } else {
        p
    }
}

// ───────────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────────

/// Presence operations over a shared TTL store.
#[derive(Clone)]
pub struct PresenceRegistry {
    store: Arc<dyn PresenceStore>,
    directory: Arc<dyn UserDirectory>,
    config: CollabConfig,
}

impl PresenceRegistry {
    pub fn new(
        store: Arc<dyn PresenceStore>,
        directory: Arc<dyn UserDirectory>,
        config: CollabConfig,
    ) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &CollabConfig {
        &self.config
    }

    /// Mark `user` as editing `document_id`.
    ///
    /// Re-joining refreshes the TTLs. Joining a different document first
    /// takes the user out of the previous one.
    pub async fn join_editing(&self, document_id: Uuid, user_id: UserId) -> bool {
        let pointer = user_editing_key(user_id);
        if let Some(Some(bytes)) = self.guarded("read editing pointer", self.store.get(&pointer)).await {
            match parse_document_id(&bytes) {
                Some(previous) if previous != document_id => {
                    log::debug!(
                        "User {} moves from document {} to {}",
                        user_id,
                        previous,
                        document_id
                    );
                    self.remove_membership(previous, user_id).await;
                }
                _ => {}
            }
        }

        let joined = self.touch(document_id, user_id).await;
        if joined {
            log::debug!("User {} joined editing document {}", user_id, document_id);
        }
        joined
    }

    /// Take `user` out of whatever document they are editing.
    pub async fn leave_editing(&self, user_id: UserId) -> bool {
        let pointer = user_editing_key(user_id);
        let document_id = match self.guarded("read editing pointer", self.store.get(&pointer)).await {
            Some(Some(bytes)) => parse_document_id(&bytes),
            Some(None) => {
                log::debug!("User {} is not editing any document", user_id);
                return false;
            }
            None => return false,
        };

        let Some(document_id) = document_id else {
            log::warn!("Dropping unreadable editing pointer for user {}", user_id);
            self.guarded("delete editing pointer", self.store.delete(&pointer)).await;
            return false;
        };

        let removed = self.remove_membership(document_id, user_id).await;
        let pointer_cleared = self
            .guarded("delete editing pointer", self.store.delete(&pointer))
            .await
            .is_some();
        log::debug!("User {} left document {}", user_id, document_id);
        removed && pointer_cleared
    }

    /// Heartbeat: extend the membership and pointer TTLs.
    ///
    /// Only refreshes a session that is still live for `document_id`; a late
    /// heartbeat after leave or expiry, or one naming another document,
    /// returns false and writes nothing.
    pub async fn refresh_editing_status(&self, document_id: Uuid, user_id: UserId) -> bool {
        let pointer = user_editing_key(user_id);
        let current = match self.guarded("read editing pointer", self.store.get(&pointer)).await {
            Some(Some(bytes)) => parse_document_id(&bytes),
            _ => None,
        };
        if current != Some(document_id) {
            log::debug!(
                "Ignoring heartbeat of user {} for document {} (editing {:?})",
                user_id,
                document_id,
                current
            );
            return false;
        }

        let ttl = self.config.editor_ttl();
        let member = self
            .guarded(
                "refresh editor",
                self.store
                    .set_touch(&editing_key(document_id), &user_id.to_string(), ttl),
            )
            .await
            .unwrap_or(false);
        if !member {
            return false;
        }
        self.guarded("refresh editing pointer", self.store.expire(&pointer, ttl))
            .await
            .unwrap_or(false)
    }

    pub async fn is_user_editing(&self, user_id: UserId, document_id: Uuid) -> bool {
        self.guarded(
            "check editor membership",
            self.store
                .set_contains(&editing_key(document_id), &user_id.to_string()),
        )
        .await
        .unwrap_or(false)
    }

    /// Store `position` for `user`, stamped with the current time.
    pub async fn update_cursor_position(&self, user_id: UserId, mut position: CursorPosition) -> bool {
        position.user_id = user_id;
        position.last_update = now_millis();
        let bytes = match position.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("Failed to encode cursor for user {}: {}", user_id, e);
                return false;
            }
        };
        self.guarded(
            "write cursor",
            self.store.put(
                &cursor_key(position.document_id, user_id),
                bytes,
                self.config.cursor_ttl(),
            ),
        )
        .await
        .is_some()
    }

    /// Current editors with their display data, ordered by user id.
    ///
    /// Editors unknown to the directory are left out. A directory failure
    /// yields an empty list.
    pub async fn online_editors(&self, document_id: Uuid) -> Vec<EditorInfo> {
        let ids = self.editor_ids(document_id).await;
        if ids.is_empty() {
            return Vec::new();
        }

        let profiles = match self.directory.lookup(&ids).await {
            Ok(profiles) => profiles,
            Err(e) => {
                log::warn!("User lookup for document {} failed: {}", document_id, e);
                return Vec::new();
            }
        };

        ids.into_iter()
            .filter_map(|id| {
                let profile = profiles.get(&id);
                if profile.is_none() {
                    log::debug!("Editor {} not found in user directory", id);
                }
                profile.map(|p| EditorInfo {
                    user_id: id,
                    display_name: p.display_name.clone(),
                    avatar_url: p.avatar_url.clone(),
                    color: cursor_color(id),
                })
            })
            .collect()
    }

    /// Fresh cursors of the current editors, ordered by user id.
    pub async fn editor_cursors(&self, document_id: Uuid) -> Vec<CursorPosition> {
        let ids = self.editor_ids(document_id).await;
        let reads = ids.iter().map(|id| {
            let key = cursor_key(document_id, *id);
            async move { self.guarded("read cursor", self.store.get(&key)).await }
        });
        let results = join_all(reads).await;

        let now = now_millis();
        let staleness = self.config.cursor_staleness().as_millis() as u64;
        results
            .into_iter()
            .flatten()
            .flatten()
            .filter_map(|bytes| match CursorPosition::decode(&bytes) {
                Ok(cursor) => Some(cursor),
                Err(e) => {
                    log::warn!("Skipping unreadable cursor in document {}: {}", document_id, e);
                    None
                }
            })
            .filter(|cursor| !cursor.is_stale(now, staleness))
            .collect()
    }

    pub async fn editor_count(&self, document_id: Uuid) -> usize {
        self.guarded("count editors", self.store.set_len(&editing_key(document_id)))
            .await
            .unwrap_or(0)
    }

    // ─── Helpers ──────────────────────────────────────────────────────

    async fn touch(&self, document_id: Uuid, user_id: UserId) -> bool {
        let ttl = self.config.editor_ttl();
        let member = self
            .guarded(
                "add editor",
                self.store
                    .set_add(&editing_key(document_id), &user_id.to_string(), ttl),
            )
            .await
            .is_some();
        let pointer = self
            .guarded(
                "write editing pointer",
                self.store.put(
                    &user_editing_key(user_id),
                    document_id.to_string().into_bytes(),
                    ttl,
                ),
            )
            .await
            .is_some();
        member && pointer
    }

    async fn remove_membership(&self, document_id: Uuid, user_id: UserId) -> bool {
        let removed = self
            .guarded(
                "remove editor",
                self.store
                    .set_remove(&editing_key(document_id), &user_id.to_string()),
            )
            .await
            .is_some();
        self.guarded(
            "delete cursor",
            self.store.delete(&cursor_key(document_id, user_id)),
        )
        .await;
        removed
    }

    async fn editor_ids(&self, document_id: Uuid) -> Vec<UserId> {
        let members = self
            .guarded("list editors", self.store.set_members(&editing_key(document_id)))
            .await
            .unwrap_or_default();
        let mut ids: Vec<UserId> = members
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        ids.sort_unstable();
        ids
    }

    async fn guarded<T>(
        &self,
        what: &str,
        call: impl Future<Output = Result<T, KvError>>,
    ) -> Option<T> {
        match within(self.config.store_deadline(), call).await {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Presence store call '{}' failed: {}", what, e);
                None
            }
        }
    }
}

fn parse_document_id(bytes: &[u8]) -> Option<Uuid> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}
