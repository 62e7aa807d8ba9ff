//! In-memory user store
//!
//! Suitable for tests and single-process deployments. Users are lost when the
//! process exits.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::{LocalUser, RepositoryError, UserId, UserIdRef, UserRepository};

/// A [`UserRepository`] held in process memory
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<UserId, LocalUser>>,
}

impl InMemoryUserRepository {
    /// Constructs an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every stored user, ordered by ID
    pub fn all(&self) -> Vec<LocalUser> {
        let mut users: Vec<_> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        users
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: &UserIdRef) -> Result<Option<LocalUser>, RepositoryError> {
        Ok(self.users.read().get(id).cloned())
    }

    async fn insert(&self, user: LocalUser) -> Result<LocalUser, RepositoryError> {
        let mut users = self.users.write();
        if users.contains_key(&user.id) {
            return Err(RepositoryError::Conflict(user.id));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn update(&self, user: LocalUser) -> Result<LocalUser, RepositoryError> {
        let mut users = self.users.write();
        match users.get_mut(&user.id) {
            Some(existing) => {
                *existing = user.clone();
                Ok(user)
            }
            None => Err(RepositoryError::NotFound(user.id)),
        }
    }
}
