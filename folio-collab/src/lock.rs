//! Advisory per-document content locks.
//!
//! ```text
//!             try_lock_content(u)
//!  Unlocked ────────────────────────► LockedBy(u)
//!     ▲                                   │
//!     └──── release_lock(doc, u) ─────────┤
//!     └──── TTL expiry (30s) ─────────────┘
//! ```
//!
//! Acquisition is an atomic set-if-absent and release an atomic
//! compare-and-delete on the owner, both delegated to the [`LockStore`].
//! A lock already held, even by the caller, is never re-acquired; the
//! holder waits for release or expiry like everyone else.

use std::sync::Arc;

use uuid::Uuid;

use folio_core::UserId;

use crate::config::CollabConfig;
use crate::kv::{lock_key, within, KvError, LockStore};

#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    config: CollabConfig,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>, config: CollabConfig) -> Self {
        Self { store, config }
    }

    /// Try to take the content lock for `document_id`.
    ///
    /// Returns false when anyone holds it, or when the store cannot be
    /// reached in time.
    pub async fn try_lock_content(&self, user_id: UserId, document_id: Uuid) -> bool {
        let key = lock_key(document_id);
        let owner = user_id.to_string();
        let call = self.store.lock_acquire(&key, &owner, self.config.lock_ttl());
        match within(self.config.store_deadline(), call).await {
            Ok(true) => {
                log::debug!("User {} locked document {}", user_id, document_id);
                true
            }
            Ok(false) => false,
            Err(e) => {
                log::warn!("Lock acquire on document {} failed: {}", document_id, e);
                false
            }
        }
    }

    /// Release the lock if `user_id` owns it.
    pub async fn release_lock(&self, document_id: Uuid, user_id: UserId) -> bool {
        let key = lock_key(document_id);
        let owner = user_id.to_string();
        let call = self.store.lock_release(&key, &owner);
        match within(self.config.store_deadline(), call).await {
            Ok(released) => {
                if released {
                    log::debug!("User {} released lock on document {}", user_id, document_id);
                } else {
                    log::debug!(
                        "User {} does not hold the lock on document {}",
                        user_id,
                        document_id
                    );
                }
                released
            }
            Err(e) => {
                log::warn!("Lock release on document {} failed: {}", document_id, e);
                false
            }
        }
    }

    /// Current owner, with store failures surfaced.
    pub async fn holder(&self, document_id: Uuid) -> Result<Option<UserId>, KvError> {
        let owner = within(
            self.config.store_deadline(),
            self.store.lock_holder(&lock_key(document_id)),
        )
        .await?;
        owner
            .map(|raw| {
                raw.parse::<UserId>()
                    .map_err(|e| KvError::Codec(format!("lock owner {raw:?}: {e}")))
            })
            .transpose()
    }

    /// Current owner, or `None` when unlocked or unknown.
    pub async fn lock_owner(&self, document_id: Uuid) -> Option<UserId> {
        match self.holder(document_id).await {
            Ok(owner) => owner,
            Err(e) => {
                log::warn!("Lock lookup on document {} failed: {}", document_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryTtlStore;
    use std::time::Duration;

    fn manager() -> (LockManager, Arc<MemoryTtlStore>) {
        let store = Arc::new(MemoryTtlStore::new());
        (LockManager::new(store.clone(), CollabConfig::default()), store)
    }

    #[tokio::test]
    async fn test_lock_then_release() {
        let (locks, _) = manager();
        let doc = Uuid::new_v4();

        assert!(locks.try_lock_content(1, doc).await);
        assert!(!locks.try_lock_content(2, doc).await);
        assert!(!locks.try_lock_content(1, doc).await);
        assert_eq!(locks.lock_owner(doc).await, Some(1));

        assert!(!locks.release_lock(doc, 2).await);
        assert_eq!(locks.lock_owner(doc).await, Some(1));
        assert!(locks.release_lock(doc, 1).await);
        assert_eq!(locks.lock_owner(doc).await, None);
        assert!(locks.try_lock_content(2, doc).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lock_expires_after_ttl() {
        let (locks, _) = manager();
        let doc = Uuid::new_v4();
        assert!(locks.try_lock_content(1, doc).await);

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(!locks.try_lock_content(2, doc).await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(locks.try_lock_content(2, doc).await);
        assert_eq!(locks.lock_owner(doc).await, Some(2));
    }

    #[tokio::test]
    async fn test_unreachable_store_denies_lock() {
        let (locks, store) = manager();
        let doc = Uuid::new_v4();
        store.set_offline(true);

        assert!(!locks.try_lock_content(1, doc).await);
        assert!(!locks.release_lock(doc, 1).await);
        assert_eq!(locks.lock_owner(doc).await, None);
        assert!(matches!(locks.holder(doc).await, Err(KvError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_locks_are_per_document() {
        let (locks, _) = manager();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(locks.try_lock_content(1, a).await);
        assert!(locks.try_lock_content(2, b).await);
        assert_eq!(locks.lock_owner(a).await, Some(1));
        assert_eq!(locks.lock_owner(b).await, Some(2));
    }
}
