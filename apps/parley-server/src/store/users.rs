//! User records and their persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use parley_common::id;

use crate::error::StoreError;

/// A registered user.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// Abstraction over user persistence.
///
/// Usernames are unique case-insensitively; the stored record keeps the
/// casing the user registered with.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user, assigning a fresh id. Fails with
    /// [`StoreError::Conflict`] when the username is already taken.
    async fn create(&self, username: &str, password_hash: &str)
        -> Result<UserRecord, StoreError>;

    /// Case-insensitive username lookup.
    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;
}

/// In-memory user store. A SQL-backed implementation slots in behind the
/// same trait.
pub struct MemoryUserStore {
    // Keyed by lowercased username.
    users: Mutex<HashMap<String, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<UserRecord, StoreError> {
        let mut users = self.users.lock();
        let key = username.to_lowercase();
        if users.contains_key(&key) {
            return Err(StoreError::Conflict);
        }

        let record = UserRecord {
            id: id::prefixed_ulid(id::prefix::USER),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        users.insert(key, record.clone());
        Ok(record)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.lock().get(&username.to_lowercase()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_find() {
        let store = MemoryUserStore::new();
        let created = store.create("Alice", "hash").await.unwrap();
        assert!(created.id.starts_with("usr_"));

        let found = store.find_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        // Original casing is preserved.
        assert_eq!(found.username, "Alice");
    }

    #[tokio::test]
    async fn duplicate_username_conflicts_case_insensitively() {
        let store = MemoryUserStore::new();
        store.create("alice", "hash").await.unwrap();

        let err = store.create("ALICE", "hash2").await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn unknown_username_is_none() {
        let store = MemoryUserStore::new();
        assert!(store.find_by_username("ghost").await.unwrap().is_none());
    }
}
