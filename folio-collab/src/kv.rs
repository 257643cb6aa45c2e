//! Shared TTL key-value store used for presence and content locks.
//!
//! Presence and locks never touch the document store. They live in a small
//! expiring key space behind two narrow traits:
//!
//! ```text
//! PresenceRegistry ──► PresenceStore ─┐
//!                                     ├──► MemoryTtlStore (or any shared cache)
//! LockManager ───────► LockStore ─────┘
//! ```
//!
//! Key layout:
//! - `folio:editing:<doc>`       set of user ids editing a document
//! - `folio:user-editing:<user>` document the user is editing
//! - `folio:cursor:<doc>:<user>` bincode-encoded cursor
//! - `folio:lock:<doc>`          lock owner user id
//!
//! Set members carry their own deadline, so one editor's heartbeat never
//! keeps another editor alive. Expiry is lazy and keyed to
//! [`tokio::time::Instant`], which lets tests pause and advance the clock.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use folio_core::UserId;

/// Failures talking to the TTL store. Never surfaced by presence or lock APIs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("Presence store unavailable: {0}")]
    Unavailable(String),
    #[error("Presence store call exceeded {0:?}")]
    Timeout(Duration),
    #[error("Presence store codec error: {0}")]
    Codec(String),
    #[error("Key {0} holds a value of the wrong type")]
    WrongType(String),
}

/// Expiring sets and values for editor presence and cursors.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Add `member` to the set at `key`, or refresh its deadline.
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), KvError>;

    /// Remove `member`; the set is deleted once empty. Returns whether the
    /// member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KvError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, KvError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError>;

    async fn set_len(&self, key: &str) -> Result<usize, KvError>;

    /// Push back the deadline of a live member. Never adds one; returns
    /// false when the member is absent or expired.
    async fn set_touch(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Returns whether a live key was removed.
    async fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Reset the TTL of a live value. Missing or expired keys stay missing.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;
}

/// Atomic primitives for content locks.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Set `key` to `owner` only if no live value exists.
    async fn lock_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn lock_holder(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Delete `key` only if its live value equals `owner`, in one step.
    async fn lock_release(&self, key: &str, owner: &str) -> Result<bool, KvError>;
}

pub(crate) fn editing_key(document_id: Uuid) -> String {
    format!("folio:editing:{document_id}")
}

pub(crate) fn user_editing_key(user_id: UserId) -> String {
    format!("folio:user-editing:{user_id}")
}

pub(crate) fn cursor_key(document_id: Uuid, user_id: UserId) -> String {
    format!("folio:cursor:{document_id}:{user_id}")
}

pub(crate) fn lock_key(document_id: Uuid) -> String {
    format!("folio:lock:{document_id}")
}

/// Run a store call under `deadline`, folding an overrun into [`KvError::Timeout`].
pub(crate) async fn within<T, F>(deadline: Duration, call: F) -> Result<T, KvError>
where
    F: Future<Output = Result<T, KvError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(KvError::Timeout(deadline)),
    }
}

#[derive(Debug)]
enum Slot {
    Value { data: Vec<u8>, expires_at: Instant },
    Set { members: HashMap<String, Instant> },
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        match self {
            Slot::Value { expires_at, .. } => *expires_at > now,
            Slot::Set { members } => members.values().any(|deadline| *deadline > now),
        }
    }
}

/// In-process [`PresenceStore`] and [`LockStore`].
///
/// A single-node stand-in for a shared cache. It can also simulate an outage
/// or a slow backend, which the tests use to exercise degraded paths.
#[derive(Debug, Default)]
pub struct MemoryTtlStore {
    slots: RwLock<HashMap<String, Slot>>,
    offline: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with [`KvError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every call by `latency` before it touches the map.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub async fn key_count(&self) -> usize {
        let now = Instant::now();
        self.slots
            .read()
            .await
            .values()
            .filter(|slot| slot.is_live(now))
            .count()
    }

    /// Drop every expired key and set member.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();
        for slot in slots.values_mut() {
            if let Slot::Set { members } = slot {
                members.retain(|_, deadline| *deadline > now);
            }
        }
        slots.retain(|_, slot| slot.is_live(now));
        before - slots.len()
    }

    async fn gate(&self) -> Result<(), KvError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }

    /// Live members of the set at `key`, or a type error.
    fn live_members(
        slots: &HashMap<String, Slot>,
        key: &str,
        now: Instant,
    ) -> Result<Vec<String>, KvError> {
        match slots.get(key) {
            None => Ok(Vec::new()),
            Some(Slot::Set { members }) => Ok(members
                .iter()
                .filter(|(_, deadline)| **deadline > now)
                .map(|(member, _)| member.clone())
                .collect()),
            Some(slot) if !slot.is_live(now) => Ok(Vec::new()),
            Some(_) => Err(KvError::WrongType(key.to_string())),
        }
    }

    fn live_value<'a>(
        slots: &'a HashMap<String, Slot>,
        key: &str,
        now: Instant,
    ) -> Result<Option<&'a Vec<u8>>, KvError> {
        match slots.get(key) {
            None => Ok(None),
            Some(Slot::Value { data, expires_at }) => {
                Ok((*expires_at > now).then_some(data))
            }
            Some(slot @ Slot::Set { .. }) if !slot.is_live(now) => Ok(None),
            Some(Slot::Set { .. }) => Err(KvError::WrongType(key.to_string())),
        }
    }
}

#[async_trait]
impl PresenceStore for MemoryTtlStore {
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> Result<(), KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot::Set {
            members: HashMap::new(),
        });
        if !slot.is_live(now) {
            *slot = Slot::Set {
                members: HashMap::new(),
            };
        }
        match slot {
            Slot::Set { members } => {
                members.retain(|_, deadline| *deadline > now);
                members.insert(member.to_string(), now + ttl);
                Ok(())
            }
            Slot::Value { .. } => Err(KvError::WrongType(key.to_string())),
        }
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let (removed, now_empty) = match slots.get_mut(key) {
            None => return Ok(false),
            Some(Slot::Set { members }) => {
                let removed = members
                    .remove(member)
                    .is_some_and(|deadline| deadline > now);
                members.retain(|_, deadline| *deadline > now);
                (removed, members.is_empty())
            }
            Some(slot) if !slot.is_live(now) => (false, true),
            Some(_) => return Err(KvError::WrongType(key.to_string())),
        };
        if now_empty {
            slots.remove(key);
        }
        Ok(removed)
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let slots = self.slots.read().await;
        Ok(Self::live_members(&slots, key, now)?
            .iter()
            .any(|m| m == member))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let slots = self.slots.read().await;
        Self::live_members(&slots, key, now)
    }

    async fn set_len(&self, key: &str) -> Result<usize, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let slots = self.slots.read().await;
        Ok(Self::live_members(&slots, key, now)?.len())
    }

    async fn set_touch(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        match slots.get_mut(key) {
            None => Ok(false),
            Some(Slot::Set { members }) => match members.get_mut(member) {
                Some(deadline) if *deadline > now => {
                    *deadline = now + ttl;
                    Ok(true)
                }
                _ => Ok(false),
            },
            Some(Slot::Value { expires_at, .. }) if *expires_at <= now => Ok(false),
            Some(Slot::Value { .. }) => Err(KvError::WrongType(key.to_string())),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        if let Some(slot @ Slot::Set { .. }) = slots.get(key) {
            if slot.is_live(now) {
                return Err(KvError::WrongType(key.to_string()));
            }
        }
        slots.insert(
            key.to_string(),
            Slot::Value {
                data: value,
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let slots = self.slots.read().await;
        Ok(Self::live_value(&slots, key, now)?.cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        Ok(slots.remove(key).is_some_and(|slot| slot.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        match slots.get_mut(key) {
            Some(Slot::Value { expires_at, .. }) if *expires_at > now => {
                *expires_at = now + ttl;
                Ok(true)
            }
            None | Some(Slot::Value { .. }) => Ok(false),
            Some(slot) if !slot.is_live(now) => Ok(false),
            Some(Slot::Set { .. }) => Err(KvError::WrongType(key.to_string())),
        }
    }
}

#[async_trait]
impl LockStore for MemoryTtlStore {
    async fn lock_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        if Self::live_value(&slots, key, now)?.is_some() {
            return Ok(false);
        }
        slots.insert(
            key.to_string(),
            Slot::Value {
                data: owner.as_bytes().to_vec(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn lock_holder(&self, key: &str) -> Result<Option<String>, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let slots = self.slots.read().await;
        match Self::live_value(&slots, key, now)? {
            Some(data) => String::from_utf8(data.clone())
                .map(Some)
                .map_err(|e| KvError::Codec(e.to_string())),
            None => Ok(None),
        }
    }

    async fn lock_release(&self, key: &str, owner: &str) -> Result<bool, KvError> {
        self.gate().await?;
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let held_by_owner = Self::live_value(&slots, key, now)?
            .is_some_and(|data| data.as_slice() == owner.as_bytes());
        if held_by_owner {
            slots.remove(key);
        }
        Ok(held_by_owner)
    }
}
