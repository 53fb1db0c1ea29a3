use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Hit/miss counters for an [`EmbeddingCache`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

struct Inner {
    entries: LruCache<String, Vec<f32>>,
    stats: CacheStats,
}

/// Thread-safe LRU cache of text -> embedding
///
/// Conversation turns frequently repeat short queries ("hi", "thanks"), and every
/// retrieval embeds the query, so remote embedders keep recent vectors here.
pub struct EmbeddingCache {
    inner: Mutex<Inner>,
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` embeddings (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up the embedding for `text`, counting the hit or miss
    pub fn get(&self, text: &str) -> Option<Vec<f32>> {
        let mut inner = self.inner.lock().unwrap();
        let found = inner.entries.get(text).cloned();
        match found {
            Some(_) => inner.stats.hits += 1,
            None => inner.stats.misses += 1,
        }
        found
    }

    /// Store the embedding for `text`, evicting the least recently used entry if full
    pub fn put(&self, text: String, embedding: Vec<f32>) {
        self.inner.lock().unwrap().entries.put(text, embedding);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }

    /// Drop all entries; statistics are kept
    pub fn clear(&self) {
        self.inner.lock().unwrap().entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_roundtrip_and_stats() {
        let cache = EmbeddingCache::new(4);
        assert!(cache.get("how are you").is_none());

        cache.put("how are you".to_string(), vec![0.5, 0.5]);
        assert_eq!(cache.get("how are you"), Some(vec![0.5, 0.5]));

        assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = EmbeddingCache::new(2);
        cache.put("hi".to_string(), vec![1.0]);
        cache.put("hello".to_string(), vec![2.0]);

        // Touch "hi" so "hello" becomes the eviction candidate
        let _ = cache.get("hi");
        cache.put("hey".to_string(), vec![3.0]);

        assert!(cache.get("hi").is_some());
        assert!(cache.get("hello").is_none());
        assert!(cache.get("hey").is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_zero_capacity_holds_one() {
        let cache = EmbeddingCache::new(0);
        cache.put("a".to_string(), vec![1.0]);
        cache.put("b".to_string(), vec![2.0]);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("b").is_some());
    }

    #[test]
    fn test_cache_clear_keeps_stats() {
        let cache = EmbeddingCache::new(8);
        cache.put("a".to_string(), vec![1.0]);
        let _ = cache.get("a");
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 1);
    }
}
