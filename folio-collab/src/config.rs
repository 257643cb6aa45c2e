//! Configuration for the collaboration layer and the document service.

use std::time::Duration;

use folio_core::VersionConfig;
use serde::{Deserialize, Serialize};

/// Presence, cursor and lock timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollabConfig {
    /// Editor membership and user → document pointer lifetime
    pub editor_ttl_secs: u64,
    /// Cursor entry lifetime
    pub cursor_ttl_secs: u64,
    /// Content lock lifetime
    pub lock_ttl_secs: u64,
    /// Cursors older than this are hidden from `editor_cursors`
    pub cursor_staleness_secs: u64,
    /// Upper bound on a single presence/lock store round trip
    pub store_deadline_ms: u64,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            editor_ttl_secs: 300,
            cursor_ttl_secs: 60,
            lock_ttl_secs: 30,
            cursor_staleness_secs: 300,
            store_deadline_ms: 500,
        }
    }
}

impl CollabConfig {
    pub fn editor_ttl(&self) -> Duration {
        Duration::from_secs(self.editor_ttl_secs)
    }

    pub fn cursor_ttl(&self) -> Duration {
        Duration::from_secs(self.cursor_ttl_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn cursor_staleness(&self) -> Duration {
        Duration::from_secs(self.cursor_staleness_secs)
    }

    pub fn store_deadline(&self) -> Duration {
        Duration::from_millis(self.store_deadline_ms)
    }
}

/// How content writes interact with the content lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WritePolicy {
    /// Writes ignore the lock; concurrent writers race, last write wins.
    #[default]
    BestEffort,
    /// The editor must hold the document's content lock to write.
    LockThenWrite,
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub version: VersionConfig,
    pub collab: CollabConfig,
    pub write_policy: WritePolicy,
}

impl ServiceConfig {
    /// Small version window, default timings.
    pub fn for_testing() -> Self {
        Self {
            version: VersionConfig::for_testing(),
            ..Self::default()
        }
    }

    pub fn with_write_policy(mut self, policy: WritePolicy) -> Self {
        self.write_policy = policy;
        self
    }
}
