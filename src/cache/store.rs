//! In-memory artifact storage.

use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

use folio_render_types::GenerationOutput;
use lru::LruCache;
use serde::Serialize;

use super::{config::ArtifactCacheConfig, keys::ArtifactKey};
use crate::util::lock::mutex_lock;

const SOURCE: &str = "cache::store";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// Narrow storage interface for generated documents.
pub trait ArtifactCache: Send + Sync {
    fn get(&self, key: &ArtifactKey) -> Option<GenerationOutput>;

    fn put(&self, key: ArtifactKey, output: GenerationOutput);

    /// Remove one entry. Returns whether it was present.
    fn invalidate(&self, key: &ArtifactKey) -> bool;

    fn stats(&self) -> CacheStats;
}

/// LRU-bounded [`ArtifactCache`].
pub struct LruArtifactCache {
    entries: Mutex<LruCache<ArtifactKey, GenerationOutput>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl LruArtifactCache {
    pub fn new(config: &ArtifactCacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.capacity_non_zero())),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn clear(&self) {
        mutex_lock(&self.entries, SOURCE, "clear").clear();
    }
}

impl ArtifactCache for LruArtifactCache {
    fn get(&self, key: &ArtifactKey) -> Option<GenerationOutput> {
        let found = mutex_lock(&self.entries, SOURCE, "get").get(key).cloned();
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    fn put(&self, key: ArtifactKey, output: GenerationOutput) {
        let mut entries = mutex_lock(&self.entries, SOURCE, "put");
        if let Some((evicted, _)) = entries.push(key.clone(), output)
            && evicted != key
        {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn invalidate(&self, key: &ArtifactKey) -> bool {
        mutex_lock(&self.entries, SOURCE, "invalidate")
            .pop(key)
            .is_some()
    }

    fn stats(&self) -> CacheStats {
        let entries = mutex_lock(&self.entries, SOURCE, "stats");
        CacheStats {
            entries: entries.len(),
            capacity: entries.cap().get(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
