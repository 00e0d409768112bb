//! LRU-cached thread reads.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use super::detector;
use crate::error::DatabaseError;
use crate::mail::MailDatabase;
use crate::models::{CacheStatistics, MailMessage, MailThread, ThreadingOutcome};

/// Default number of threads kept in memory.
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// A strict-LRU cache over thread rows, with hit/miss statistics.
///
/// The cache is guarded by a single mutex, so lookups, insertions, and
/// invalidations are atomic relative to each other; externally every
/// operation behaves as if serialized. Eviction happens on insertion into a
/// full cache and removes the least-recently-used entry.
pub struct CachedThreadService {
    cache: Mutex<LruCache<String, MailThread>>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl CachedThreadService {
    /// A service caching up to `capacity` threads.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        }
    }

    /// Cache-through read of a thread row.
    ///
    /// A hit refreshes the entry's recency; a miss reads the backing
    /// database and caches the row when it exists.
    pub async fn get_thread(
        &self,
        thread_id: &str,
        db: &MailDatabase,
    ) -> Result<Option<MailThread>, DatabaseError> {
        if let Some(thread) = self.cache.lock().get(thread_id).cloned() {
            self.hit_count.fetch_add(1, Ordering::Relaxed);
            return Ok(Some(thread));
        }
        self.miss_count.fetch_add(1, Ordering::Relaxed);

        let thread = db.get_thread(thread_id).await?;
        if let Some(thread) = &thread {
            self.cache.lock().put(thread_id.to_string(), thread.clone());
        }
        Ok(thread)
    }

    /// Thread a message, then refresh the cache entry with the post-update
    /// thread row.
    pub async fn process_message_for_threading(
        &self,
        db: &MailDatabase,
        message: &MailMessage,
    ) -> Result<ThreadingOutcome, DatabaseError> {
        let outcome = detector::process_message_for_threading(db, message).await?;
        if let Some(thread) = db.get_thread(&outcome.thread_id).await? {
            self.cache.lock().put(outcome.thread_id.clone(), thread);
        }
        Ok(outcome)
    }

    /// Recompute a thread's persisted aggregates and refresh its cache
    /// entry.
    pub async fn update_thread_metadata(
        &self,
        thread_id: &str,
        db: &MailDatabase,
    ) -> Result<(), DatabaseError> {
        detector::refresh_thread_metadata(db.pool()?, thread_id).await?;
        match db.get_thread(thread_id).await? {
            Some(thread) => {
                self.cache.lock().put(thread_id.to_string(), thread);
            }
            None => {
                self.cache.lock().pop(thread_id);
            }
        }
        Ok(())
    }

    /// Drop one cached thread.
    pub fn invalidate_thread(&self, thread_id: &str) {
        self.cache.lock().pop(thread_id);
    }

    /// Drop every cached thread. Statistics are unaffected.
    pub fn invalidate_all_threads(&self) {
        self.cache.lock().clear();
    }

    pub fn cache_statistics(&self) -> CacheStatistics {
        let hit_count = self.hit_count.load(Ordering::Relaxed);
        let miss_count = self.miss_count.load(Ordering::Relaxed);
        let total = hit_count + miss_count;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hit_count as f64 / total as f64 * 100.0
        };
        CacheStatistics {
            hit_count,
            miss_count,
            size: self.cache.lock().len(),
            hit_rate,
        }
    }

    pub fn reset_cache_statistics(&self) {
        self.hit_count.store(0, Ordering::Relaxed);
        self.miss_count.store(0, Ordering::Relaxed);
    }
}

impl Default for CachedThreadService {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
