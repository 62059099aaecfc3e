//! Bounded in-process cache with LFU eviction.
//!
//! One coarse lock guards the map; every operation under it is O(1), so
//! concurrent requests only contend for the bookkeeping, never for I/O.
//!
//! ## Metrics
//!
//! `hits`/`misses`/`evictions`/`entries` are atomics readable without
//! taking the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tile_common::{Grants, TileError, TileResult};
use tokio::sync::Mutex;
use tracing::debug;

use crate::lfu::LfuCache;
use crate::provider::{new_provider_id, CacheKey, Cacheable, Provider};

/// Statistics for an in-process cache.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub entries: AtomicU64,
}

impl CacheStats {
    /// Hit rate as a percentage (0-100).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }

    pub fn entries(&self) -> u64 {
        self.entries.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// In-process cache provider holding at most `capacity` values.
pub struct MemoryCache<T: Cacheable> {
    id: String,
    entries: Mutex<LfuCache<String, T>>,
    stats: Arc<CacheStats>,
}

impl<T: Cacheable> MemoryCache<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_id(new_provider_id(), capacity)
    }

    pub fn with_id(id: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: id.into(),
            entries: Mutex::new(LfuCache::new(capacity)),
            stats: Arc::new(CacheStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<CacheStats> {
        self.stats.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Whether a key is cached, without counting an access.
    pub async fn contains(&self, key: &T::Key) -> bool {
        self.entries.lock().await.contains(&key.hash())
    }
}

#[async_trait]
impl<T: Cacheable> Provider<T> for MemoryCache<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn pull(&self, key: &T::Key, grants: &Grants) -> TileResult<T> {
        let hash = key.hash();
        let found = {
            let mut entries = self.entries.lock().await;
            entries.get(&hash).cloned()
        };

        match found {
            Some(item) if grants.permits(item.grant()) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Ok(item)
            }
            _ => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                Err(TileError::not_found(hash))
            }
        }
    }

    async fn push(&self, item: T) {
        if item.provenance() == self.id {
            return;
        }

        let hash = item.key().hash();
        let item = item.with_provenance(&self.id);
        let mut entries = self.entries.lock().await;
        if let Some((evicted, _)) = entries.insert(hash, item) {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(cache = %self.id, key = %evicted, "Evicted least frequently used entry");
        }
        self.stats
            .entries
            .store(entries.len() as u64, Ordering::Relaxed);
    }
}
