//! Redis-backed key-value cache.
//!
//! Holds session snapshots and cached course documents. Every call checks a
//! connection out of the pool; nothing is cached in-process, so several
//! server instances can share one Redis.

use async_trait::async_trait;
use coursehub_platform_access::{CacheError, KeyValueCache};
use deadpool_redis::redis::AsyncCommands;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use std::time::Duration;
use tracing::{debug, info};

/// Cache backed by a deadpool-redis connection pool.
#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
}

impl RedisCache {
    /// Creates the pool and verifies that Redis answers.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::Unavailable` if the URL is invalid or no
    /// connection can be made.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Unavailable {
                details: e.to_string(),
            })?;
        let cache = Self { pool };
        cache.connection().await?;
        info!("connected to redis");
        Ok(cache)
    }

    async fn connection(&self) -> Result<Connection, CacheError> {
        self.pool.get().await.map_err(|e| CacheError::Unavailable {
            details: e.to_string(),
        })
    }
}

fn command_error(key: &str, e: deadpool_redis::redis::RedisError) -> CacheError {
    CacheError::Command {
        key: key.to_string(),
        details: e.to_string(),
    }
}

#[async_trait]
impl KeyValueCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| command_error(key, e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        match ttl {
            // SETEX rejects a zero expiry.
            Some(ttl) => {
                let seconds = ttl.as_secs().max(1);
                conn.set_ex::<_, _, ()>(key, value, seconds)
                    .await
                    .map_err(|e| command_error(key, e))?;
                debug!(key, ttl_secs = seconds, "cache set");
            }
            None => {
                conn.set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| command_error(key, e))?;
                debug!(key, "cache set without expiry");
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| command_error(key, e))
    }
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("pool_status", &self.pool.status())
            .finish()
    }
}
