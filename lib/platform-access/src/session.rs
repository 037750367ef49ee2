//! Session store adapter.
//!
//! A session is a JSON snapshot of the [`User`] stored in the external cache
//! under the user's id. Its presence is what keeps otherwise stateless tokens
//! usable: deleting the entry revokes every outstanding token for that user.
//!
//! There is no in-process fallback. If the cache cannot be
//! reached, callers get [`SessionError::Unavailable`] and fail closed.

use crate::cache::KeyValueCache;
use crate::error::SessionError;
use crate::user::User;
use coursehub_core::UserId;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Reads and writes user snapshots in the external cache.
#[derive(Clone)]
pub struct SessionStore {
    cache: Arc<dyn KeyValueCache>,
    ttl: Option<Duration>,
}

impl SessionStore {
    /// Creates a store whose entries never expire on their own.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>) -> Self {
        Self { cache, ttl: None }
    }

    /// Sets the lifetime applied to every written entry.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Returns the lifetime applied to written entries.
    #[must_use]
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    /// Returns the cache key for a user's session.
    #[must_use]
    pub fn key(user_id: UserId) -> String {
        user_id.to_string()
    }

    /// Overwrites the session entry with the user's current state.
    #[instrument(skip(self, user), fields(user_id = %user.id()))]
    pub async fn put(&self, user: &User) -> Result<(), SessionError> {
        let snapshot = serde_json::to_string(user).map_err(|e| SessionError::Encode {
            details: e.to_string(),
        })?;
        self.cache
            .set(&Self::key(user.id()), &snapshot, self.ttl)
            .await
            .map_err(|e| SessionError::Unavailable {
                details: e.to_string(),
            })?;
        debug!("session snapshot written");
        Ok(())
    }

    /// Returns the session snapshot, or `None` if there is no session.
    #[instrument(skip(self))]
    pub async fn get(&self, user_id: UserId) -> Result<Option<User>, SessionError> {
        let Some(snapshot) = self
            .cache
            .get(&Self::key(user_id))
            .await
            .map_err(|e| SessionError::Unavailable {
                details: e.to_string(),
            })?
        else {
            return Ok(None);
        };

        let user = serde_json::from_str(&snapshot).map_err(|e| SessionError::CorruptSnapshot {
            user_id,
            details: e.to_string(),
        })?;
        Ok(Some(user))
    }

    /// Removes the session entry, revoking the user's tokens.
    #[instrument(skip(self))]
    pub async fn delete(&self, user_id: UserId) -> Result<(), SessionError> {
        self.cache
            .delete(&Self::key(user_id))
            .await
            .map_err(|e| SessionError::Unavailable {
                details: e.to_string(),
            })
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::role::Role;
    use coursehub_core::CourseId;

    fn learner() -> User {
        User::new(
            "Alice".to_string(),
            "alice@example.com".to_string(),
            Role::Learner,
        )
    }

    #[tokio::test]
    async fn put_then_get_returns_snapshot() {
        let store = SessionStore::new(Arc::new(MemoryCache::new()));
        let mut user = learner();
        user.grant_course(CourseId::new());

        store.put(&user).await.expect("put");
        let restored = store.get(user.id()).await.expect("get");
        assert_eq!(restored, Some(user));
    }

    #[tokio::test]
    async fn missing_session_is_none() {
        let store = SessionStore::new(Arc::new(MemoryCache::new()));
        assert_eq!(store.get(UserId::new()).await.expect("get"), None);
    }

    #[tokio::test]
    async fn entries_are_keyed_by_user_id() {
        let cache = Arc::new(MemoryCache::new());
        let store = SessionStore::new(cache.clone());
        let user = learner();

        store.put(&user).await.expect("put");
        assert!(cache.contains(&user.id().to_string()));
    }

    #[tokio::test]
    async fn put_applies_ttl() {
        let cache = Arc::new(MemoryCache::new());
        let store = SessionStore::new(cache.clone()).with_ttl(Duration::from_secs(3600));
        let user = learner();

        store.put(&user).await.expect("put");
        let ttl = cache.remaining_ttl(&SessionStore::key(user.id())).expect("ttl");
        assert!(ttl > Duration::from_secs(3500));
    }

    #[tokio::test]
    async fn delete_revokes() {
        let store = SessionStore::new(Arc::new(MemoryCache::new()));
        let user = learner();

        store.put(&user).await.expect("put");
        store.delete(user.id()).await.expect("delete");
        assert_eq!(store.get(user.id()).await.expect("get"), None);
    }

    #[tokio::test]
    async fn unreachable_cache_is_a_hard_error() {
        let cache = Arc::new(MemoryCache::new());
        let store = SessionStore::new(cache.clone());
        cache.set_offline(true);

        assert!(matches!(
            store.get(UserId::new()).await,
            Err(SessionError::Unavailable { .. })
        ));
        assert!(matches!(
            store.put(&learner()).await,
            Err(SessionError::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_reported() {
        let cache = Arc::new(MemoryCache::new());
        let store = SessionStore::new(cache.clone());
        let user_id = UserId::new();
        cache
            .set(&SessionStore::key(user_id), "{not json", None)
            .await
            .expect("set");

        assert!(matches!(
            store.get(user_id).await,
            Err(SessionError::CorruptSnapshot { .. })
        ));
    }
}
