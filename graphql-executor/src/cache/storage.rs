use std::num::NonZeroUsize;

use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use tokio::sync::Mutex;

use super::QueryCache;

/// An unbounded in-memory cache. This is the default.
#[derive(Debug)]
pub struct InMemoryCache<V> {
    inner: DashMap<String, V>,
}

impl<V> InMemoryCache<V> {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<V> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> QueryCache<V> for InMemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).map(|entry| entry.value().clone())
    }

    async fn add(&self, key: String, value: V) {
        self.inner.insert(key, value);
    }
}

/// An in-memory cache holding at most `capacity` entries, evicting the least recently used.
pub struct LruQueryCache<V> {
    inner: Mutex<LruCache<String, V>>,
}

impl<V> LruQueryCache<V> {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[async_trait]
impl<V> QueryCache<V> for LruQueryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.inner.lock().await.get(key).cloned()
    }

    async fn add(&self, key: String, value: V) {
        self.inner.lock().await.put(key, value);
    }
}

/// A cache that never stores anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

#[async_trait]
impl<V> QueryCache<V> for NoCache
where
    V: Send + 'static,
{
    async fn get(&self, _key: &str) -> Option<V> {
        None
    }

    async fn add(&self, _key: String, _value: V) {}
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test(tokio::test)]
    async fn in_memory_cache() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.get("{ name }").await, None::<u32>);
        cache.add("{ name }".to_string(), 1).await;
        cache.add("{ name }".to_string(), 2).await;
        assert_eq!(cache.get("{ name }").await, Some(2));
        assert_eq!(cache.len(), 1);
    }

    #[test(tokio::test)]
    async fn lru_cache_evicts_least_recently_used() {
        let cache = LruQueryCache::new(NonZeroUsize::new(2).unwrap());
        cache.add("a".to_string(), 1).await;
        cache.add("b".to_string(), 2).await;
        // touch a so b becomes the eviction candidate
        assert_eq!(cache.get("a").await, Some(1));
        cache.add("c".to_string(), 3).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("a").await, Some(1));
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("c").await, Some(3));
    }

    #[test(tokio::test)]
    async fn no_cache() {
        let cache = NoCache;
        QueryCache::<u32>::add(&cache, "a".to_string(), 1).await;
        assert_eq!(QueryCache::<u32>::get(&cache, "a").await, None);
    }
}
