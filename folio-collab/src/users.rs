//! User directory used to decorate presence with display names.

use std::collections::HashMap;

use async_trait::async_trait;
use folio_core::UserId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display data for a platform user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }
}

#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    #[error("User directory unavailable: {0}")]
    Unavailable(String),
}

/// Batch lookup of user profiles.
///
/// Unknown ids are simply absent from the result.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>, DirectoryError>;
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: HashMap<UserId, UserProfile>,
}

impl StaticUserDirectory {
    pub fn new(users: impl IntoIterator<Item = UserProfile>) -> Self {
        Self {
            users: users.into_iter().map(|u| (u.user_id, u)).collect(),
        }
    }

    pub fn insert(&mut self, profile: UserProfile) {
        self.users.insert(profile.user_id, profile);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn lookup(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserProfile>, DirectoryError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| (*id, u.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_skips_unknown_ids() {
        let directory = StaticUserDirectory::new([
            UserProfile::new(1, "Ada"),
            UserProfile::new(2, "Grace").with_avatar("https://example.org/g.png"),
        ]);

        let found = directory.lookup(&[2, 3]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&2].display_name, "Grace");
        assert!(found[&2].avatar_url.is_some());
    }
}
