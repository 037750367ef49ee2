//! Read-through, write-through course cache.
//!
//! Reads consult the cache first and populate it from the store on a miss.
//! Every committed mutation overwrites the entry with the new snapshot and
//! resets its expiry; deletion is the only path that removes an entry.
//! Misses are never cached.

use crate::course::Course;
use crate::error::{CatalogError, StoreError};
use crate::store::CourseStore;
use coursehub_core::CourseId;
use coursehub_platform_access::KeyValueCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default lifetime of a cached course: seven days.
pub const DEFAULT_COURSE_TTL: Duration = Duration::from_secs(604_800);

/// Course reads and writes with cache consistency.
#[derive(Clone)]
pub struct CourseCache {
    cache: Arc<dyn KeyValueCache>,
    store: Arc<dyn CourseStore>,
    ttl: Duration,
}

impl CourseCache {
    /// Creates a cache with the default TTL.
    #[must_use]
    pub fn new(cache: Arc<dyn KeyValueCache>, store: Arc<dyn CourseStore>) -> Self {
        Self {
            cache,
            store,
            ttl: DEFAULT_COURSE_TTL,
        }
    }

    /// Overrides the entry lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CourseStore> {
        &self.store
    }

    /// Returns the cache key for a course.
    #[must_use]
    pub fn key(course_id: CourseId) -> String {
        course_id.to_string()
    }

    /// Returns the course, reading through the cache.
    ///
    /// A failed or undecodable cache read falls back to the store. A failed
    /// populate after a store read is logged and the store result returned.
    ///
    /// # Errors
    ///
    /// Returns `Store` only if the store itself fails.
    #[instrument(skip(self))]
    pub async fn get(&self, course_id: CourseId) -> Result<Option<Course>, CatalogError> {
        let key = Self::key(course_id);
        match self.cache.get(&key).await {
            Ok(Some(snapshot)) => match serde_json::from_str::<Course>(&snapshot) {
                Ok(course) => {
                    debug!("course cache hit");
                    return Ok(Some(course));
                }
                Err(e) => warn!(error = %e, "discarding undecodable cached course"),
            },
            Ok(None) => debug!("course cache miss"),
            Err(e) => warn!(error = %e, "course cache read failed, using store"),
        }

        let Some(course) = self.store.find_by_id(course_id).await? else {
            return Ok(None);
        };
        if let Err(e) = self.put(&course).await {
            warn!(error = %e, "failed to populate course cache");
        }
        Ok(Some(course))
    }

    /// Overwrites the cache entry after a committed mutation.
    ///
    /// # Errors
    ///
    /// Returns `CacheWrite` if the cache rejects the write. The store remains
    /// authoritative; the stale entry expires on its own.
    #[instrument(skip(self, course), fields(course_id = %course.id))]
    pub async fn write_through(&self, course: &Course) -> Result<(), CatalogError> {
        self.put(course).await
    }

    /// Persists the course and writes the committed row, not the caller's
    /// copy, through to the cache. Returns the committed row.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the update fails (cache untouched), or `CacheWrite`
    /// if the update committed but the cache write failed.
    pub async fn commit(&self, course: &Course) -> Result<Course, CatalogError> {
        let committed = self.store.update(course).await.map_err(|e| match e {
            StoreError::Missing { .. } => CatalogError::CourseNotFound {
                course_id: course.id,
            },
            other => CatalogError::Store(other),
        })?;
        self.write_through(&committed).await?;
        Ok(committed)
    }

    /// Removes the cache entry. Used only when the course is deleted.
    ///
    /// # Errors
    ///
    /// Returns `CacheWrite` if the cache cannot be reached.
    #[instrument(skip(self))]
    pub async fn evict(&self, course_id: CourseId) -> Result<(), CatalogError> {
        self.cache
            .delete(&Self::key(course_id))
            .await
            .map_err(|e| CatalogError::CacheWrite {
                course_id,
                details: e.to_string(),
            })
    }

    async fn put(&self, course: &Course) -> Result<(), CatalogError> {
        let snapshot = serde_json::to_string(course).map_err(|e| CatalogError::CacheWrite {
            course_id: course.id,
            details: e.to_string(),
        })?;
        self.cache
            .set(&Self::key(course.id), &snapshot, Some(self.ttl))
            .await
            .map_err(|e| CatalogError::CacheWrite {
                course_id: course.id,
                details: e.to_string(),
            })
    }
}

impl std::fmt::Debug for CourseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CourseCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}
