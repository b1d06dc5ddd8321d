use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::QueryCache;
use crate::spec::Query;
use crate::spec::SpecError;

type DocumentResult = Result<Arc<Query>, SpecError>;
type WaitMap = Arc<Mutex<HashMap<String, broadcast::Sender<DocumentResult>>>>;

/// Sits in front of a [`QueryCache`] so that concurrent misses on the same query text build the
/// document once.
///
/// Failed builds are handed to the waiters but never stored.
#[derive(Clone)]
pub(crate) struct DedupCache {
    storage: Arc<dyn QueryCache<Arc<Query>>>,
    wait_map: WaitMap,
}

impl DedupCache {
    pub(crate) fn new(storage: Arc<dyn QueryCache<Arc<Query>>>) -> Self {
        Self {
            storage,
            wait_map: Default::default(),
        }
    }

    /// Returns the cached document for `key`, or builds, stores and returns it.
    pub(crate) async fn get_or_build<F>(&self, key: &str, build: F) -> DocumentResult
    where
        F: FnOnce() -> Result<Query, SpecError>,
    {
        if let Some(document) = self.storage.get(key).await {
            tracing::trace!("document cache hit");
            return Ok(document);
        }

        let receiver = {
            let mut wait_map = self.wait_map.lock();
            match wait_map.get(key) {
                // Register interest in key
                Some(sender) => Some(sender.subscribe()),
                None => {
                    let (sender, _receiver) = broadcast::channel(1);
                    wait_map.insert(key.to_string(), sender);
                    None
                }
            }
        };

        if let Some(mut receiver) = receiver {
            match receiver.recv().await {
                Ok(result) => return result,
                // the first caller was dropped before finishing
                Err(_) => return self.build(key, build).await,
            }
        }

        let guard = WaitGuard {
            wait_map: self.wait_map.clone(),
            key: Some(key.to_string()),
        };
        // a build may have completed between the lookup and the registration
        let result = match self.storage.get(key).await {
            Some(document) => Ok(document),
            None => self.build(key, build).await,
        };
        if let Some(sender) = guard.finish() {
            let _ = sender.send(result.clone());
        }
        result
    }

    async fn build<F>(&self, key: &str, build: F) -> DocumentResult
    where
        F: FnOnce() -> Result<Query, SpecError>,
    {
        tracing::debug!("document cache miss");
        let document = Arc::new(build()?);
        self.storage.add(key.to_string(), document.clone()).await;
        Ok(document)
    }
}

/// Removes the wait map entry when the first caller finishes or is dropped.
struct WaitGuard {
    wait_map: WaitMap,
    key: Option<String>,
}

impl WaitGuard {
    fn finish(mut self) -> Option<broadcast::Sender<DocumentResult>> {
        let key = self.key.take()?;
        self.wait_map.lock().remove(&key)
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.wait_map.lock().remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use test_log::test;

    use super::*;
    use crate::cache::InMemoryCache;
    use crate::Configuration;

    /// Storage whose writes take a while, so that other lookups arrive mid-build.
    struct SlowStorage(InMemoryCache<Arc<Query>>);

    #[async_trait::async_trait]
    impl QueryCache<Arc<Query>> for SlowStorage {
        async fn get(&self, key: &str) -> Option<Arc<Query>> {
            self.0.get(key).await
        }

        async fn add(&self, key: String, value: Arc<Query>) {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.0.add(key, value).await
        }
    }

    #[test(tokio::test)]
    async fn concurrent_misses_build_once() {
        let storage = Arc::new(SlowStorage(InMemoryCache::new()));
        let cache = DedupCache::new(storage.clone());
        let builds = Arc::new(AtomicUsize::new(0));

        let lookups = (0..10).map(|_| {
            let cache = cache.clone();
            let builds = builds.clone();
            tokio::spawn(async move {
                cache
                    .get_or_build("query Foo { name }", || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Query::parse("query Foo { name }", &Configuration::default())
                    })
                    .await
            })
        });
        for result in futures::future::join_all(lookups).await {
            let document = result.unwrap().unwrap();
            assert_eq!(document.operations()[0].name(), Some("Foo"));
        }

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(storage.0.len(), 1);
        assert!(cache.wait_map.lock().is_empty());

        // later lookups are served from storage
        cache
            .get_or_build("query Foo { name }", || panic!("should be cached"))
            .await
            .unwrap();
    }

    #[test(tokio::test)]
    async fn failures_are_not_stored() {
        let storage = Arc::new(InMemoryCache::<Arc<Query>>::new());
        let cache = DedupCache::new(storage.clone());

        let error = cache
            .get_or_build("{", || Query::parse("{", &Configuration::default()))
            .await
            .unwrap_err();
        assert!(matches!(error, SpecError::ParsingError { .. }));
        assert!(storage.is_empty());
        assert!(cache.wait_map.lock().is_empty());
    }
}
