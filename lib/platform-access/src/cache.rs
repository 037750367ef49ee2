//! External key-value cache port.
//!
//! Sessions and course snapshots both live in a shared string-keyed cache.
//! Production uses Redis; `MemoryCache` backs tests and single-instance
//! development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Errors from the external cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Could not obtain a connection.
    Unavailable { details: String },
    /// The cache rejected or failed a command.
    Command { key: String, details: String },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable { details } => write!(f, "cache unavailable: {details}"),
            Self::Command { key, details } => {
                write!(f, "cache command failed for key '{key}': {details}")
            }
        }
    }
}

impl std::error::Error for CacheError {}

/// String-keyed cache with optional per-entry expiry.
#[async_trait]
pub trait KeyValueCache: Send + Sync {
    /// Returns the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Removes `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process cache.
///
/// Can be switched offline to exercise failure paths.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, Entry>>,
    offline: AtomicBool,
}

impl MemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `CacheError::Unavailable` while
    /// `offline` is true.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Returns the remaining lifetime of a live entry, or `None` if the entry
    /// is absent or has no expiry.
    #[must_use]
    pub fn remaining_ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Returns true if a live entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).is_some_and(|entry| entry.is_live(now))
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable {
                details: "memory cache is offline".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_online()?;
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.check_online()?;
        let entry = Entry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.expect("set");
        assert_eq!(cache.get("k").await.expect("get"), Some("v".to_string()));
        assert!(cache.contains("k"));
        assert_eq!(cache.remaining_ttl("k"), None);
    }

    #[tokio::test]
    async fn set_overwrites_value_and_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v1", Some(Duration::from_secs(10)))
            .await
            .expect("set");
        cache
            .set("k", "v2", Some(Duration::from_secs(1000)))
            .await
            .expect("set");

        assert_eq!(cache.get("k").await.expect("get"), Some("v2".to_string()));
        let ttl = cache.remaining_ttl("k").expect("ttl");
        assert!(ttl > Duration::from_secs(900));
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v", Some(Duration::from_millis(10)))
            .await
            .expect("set");
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.expect("get"), None);
        assert!(!cache.contains("k"));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let cache = MemoryCache::new();
        cache.set("k", "v", None).await.expect("set");
        cache.delete("k").await.expect("delete");
        cache.delete("k").await.expect("delete again");
        assert_eq!(cache.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn offline_cache_fails_every_call() {
        let cache = MemoryCache::new();
        cache.set_offline(true);

        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable { .. })
        ));
        assert!(cache.set("k", "v", None).await.is_err());
        assert!(cache.delete("k").await.is_err());

        cache.set_offline(false);
        assert_eq!(cache.get("k").await.expect("get"), None);
    }
}
