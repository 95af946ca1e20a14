use lru::LruCache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe LRU cache of query embeddings, keyed by a hash of the query text.
///
/// Clones share the same underlying cache.
#[derive(Clone)]
pub struct QueryEmbeddingCache {
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl QueryEmbeddingCache {
    /// A zero capacity is bumped to one entry.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn get(&self, key: &str) -> Option<Vec<f32>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    pub fn put(&self, key: String, value: Vec<f32>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(key, value);
    }

    pub fn len(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stable key for a query string. The model name is mixed in so switching
    /// models never serves stale vectors.
    pub fn generate_key(&self, model: &str, query: &str) -> String {
        let mut hasher = DefaultHasher::new();
        model.hash(&mut hasher);
        query.as_bytes().hash(&mut hasher);
        format!("{:x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cache_hit_after_put() {
        let cache = QueryEmbeddingCache::new(10);
        let key = cache.generate_key("voyage-multimodal-3", "cardapio");

        cache.put(key.clone(), vec![0.1, 0.2]);

        assert_eq!(cache.get(&key), Some(vec![0.1, 0.2]));
    }

    #[test]
    fn test_cache_miss() {
        let cache = QueryEmbeddingCache::new(10);
        assert_eq!(cache.get("nonexistent_key"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_holds_one_entry() {
        let cache = QueryEmbeddingCache::new(0);
        cache.put("a".to_string(), vec![1.0]);
        cache.put("b".to_string(), vec![2.0]);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("b"), Some(vec![2.0]));
    }

    #[test]
    fn test_key_depends_on_model() {
        let cache = QueryEmbeddingCache::new(10);
        assert_eq!(
            cache.generate_key("m1", "same query"),
            cache.generate_key("m1", "same query")
        );
        assert_ne!(
            cache.generate_key("m1", "same query"),
            cache.generate_key("m2", "same query")
        );
    }

    #[test]
    fn test_lru_ordering() {
        let cache = QueryEmbeddingCache::new(2);

        cache.put("q1".to_string(), vec![1.0]);
        cache.put("q2".to_string(), vec![2.0]);
        let _ = cache.get("q1");
        cache.put("q3".to_string(), vec![3.0]);

        assert_eq!(cache.get("q1"), Some(vec![1.0]));
        assert_eq!(cache.get("q2"), None);
        assert_eq!(cache.get("q3"), Some(vec![3.0]));
    }

    #[test]
    fn test_concurrent_access() {
        let cache = QueryEmbeddingCache::new(100);
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let cache = cache.clone();
                thread::spawn(move || {
                    let key = cache.generate_key("m", &format!("query_{i}"));
                    cache.put(key.clone(), vec![i as f32]);
                    assert_eq!(cache.get(&key), Some(vec![i as f32]));
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(cache.len(), 10);
    }
}
