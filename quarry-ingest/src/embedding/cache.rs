//! Content-addressed embedding cache.
//!
//! Keys are `(content_hash, model_id)`: the same text embedded under a
//! different model is a different entry. LRU eviction with a TTL.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cache limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingCacheConfig {
    /// Entry ceiling before LRU eviction.
    pub max_entries: usize,
    /// Entry lifetime; `None` disables expiry.
    pub ttl: Option<Duration>,
}

impl Default for EmbeddingCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            ttl: Some(Duration::from_secs(3600)),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Vec<f32>,
    created_at: Instant,
    last_accessed: Instant,
}

/// Hit, miss, and eviction counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found a live entry.
    pub hits: usize,
    /// Lookups that found nothing or an expired entry.
    pub misses: usize,
    /// Entries removed by LRU pressure or TTL.
    pub evictions: usize,
    /// Current entry count.
    pub entries: usize,
}

/// LRU embedding cache keyed by `(content_hash, model_id)`.
#[derive(Debug)]
pub struct EmbeddingCache {
    entries: RwLock<HashMap<(String, String), CacheEntry>>,
    stats: RwLock<CacheStats>,
    config: EmbeddingCacheConfig,
}

impl EmbeddingCache {
    /// Empty cache.
    #[must_use]
    pub fn new(config: EmbeddingCacheConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            stats: RwLock::new(CacheStats::default()),
            config,
        }
    }

    /// Look up an embedding.
    #[must_use]
    pub fn get(&self, content_hash: &str, model_id: &str) -> Option<Vec<f32>> {
        let key = (content_hash.to_string(), model_id.to_string());
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        if let Some(entry) = entries.get_mut(&key) {
            if let Some(ttl) = self.config.ttl {
                if entry.created_at.elapsed() > ttl {
                    entries.remove(&key);
                    stats.evictions += 1;
                    stats.misses += 1;
                    stats.entries = entries.len();
                    return None;
                }
            }
            entry.last_accessed = Instant::now();
            stats.hits += 1;
            return Some(entry.embedding.clone());
        }
        stats.misses += 1;
        None
    }

    /// Store an embedding, evicting the least recently used entry if full.
    pub fn put(&self, content_hash: &str, model_id: &str, embedding: Vec<f32>) {
        let key = (content_hash.to_string(), model_id.to_string());
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();

        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
                stats.evictions += 1;
            }
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                embedding,
                created_at: now,
                last_accessed: now,
            },
        );
        stats.entries = entries.len();
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        *self.stats.read()
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let mut stats = self.stats.write();
        entries.clear();
        stats.entries = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_put_get() {
        let cache = EmbeddingCache::new(EmbeddingCacheConfig::default());
        cache.put("hash-a", "model-1", vec![1.0, 2.0]);

        assert_eq!(cache.get("hash-a", "model-1"), Some(vec![1.0, 2.0]));
        assert_eq!(cache.get("hash-a", "model-2"), None);
        assert_eq!(cache.get("hash-b", "model-1"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = EmbeddingCache::new(EmbeddingCacheConfig {
            max_entries: 2,
            ttl: None,
        });
        cache.put("a", "m", vec![1.0]);
        cache.put("b", "m", vec![2.0]);
        // Touch "a" so "b" is the LRU victim.
        let _ = cache.get("a", "m");
        cache.put("c", "m", vec![3.0]);

        assert!(cache.get("a", "m").is_some());
        assert!(cache.get("b", "m").is_none());
        assert!(cache.get("c", "m").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = EmbeddingCache::new(EmbeddingCacheConfig {
            max_entries: 10,
            ttl: Some(Duration::from_millis(0)),
        });
        cache.put("a", "m", vec![1.0]);
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("a", "m").is_none());
        assert_eq!(cache.stats().evictions, 1);
    }
}
