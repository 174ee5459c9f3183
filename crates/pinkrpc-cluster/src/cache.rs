//! Shared, reference-counted invoker cache.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pinkrpc_common::ServiceUrl;
use tracing::{debug, info};

use crate::error::Result;
use crate::invoker::{Invoker, InvokerFactory};

struct CachedInvoker {
    invoker: Arc<dyn Invoker>,
    refs: usize,
}

/// Invokers keyed by provider identity key.
///
/// Every directory that resolves the same provider shares one invoker. The
/// invoker is created on the first [`acquire`](Self::acquire) and destroyed
/// when the matching [`release`](Self::release) drops the last reference.
pub struct InvokerCache {
    factory: Arc<dyn InvokerFactory>,
    entries: DashMap<String, CachedInvoker>,
}

impl InvokerCache {
    /// Creates an empty cache backed by `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn InvokerFactory>) -> Self {
        Self {
            factory,
            entries: DashMap::new(),
        }
    }

    /// Returns the shared invoker for `provider`, creating it if needed.
    ///
    /// The factory runs outside the map's locks, so it may block or call
    /// back into the cache. When two callers race to create the same
    /// provider, the loser's invoker is destroyed and the winner's is shared.
    ///
    /// # Errors
    ///
    /// Propagates the factory error when the invoker has to be created and
    /// creation fails. Nothing is cached in that case.
    pub fn acquire(&self, provider: &ServiceUrl) -> Result<Arc<dyn Invoker>> {
        let key = provider.identity_key();
        if let Some(invoker) = self.reuse(&key) {
            return Ok(invoker);
        }

        let created = self.factory.create(provider)?;
        let raced = match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                let cached = entry.get_mut();
                cached.refs += 1;
                let (invoker, refs) = (Arc::clone(&cached.invoker), cached.refs);
                debug!(provider = %entry.key(), refs, "Invoker created concurrently, reusing cached one");
                invoker
            }
            Entry::Vacant(entry) => {
                info!(provider = %entry.key(), "Invoker created");
                entry.insert(CachedInvoker {
                    invoker: Arc::clone(&created),
                    refs: 1,
                });
                return Ok(created);
            }
        };

        created.destroy();
        Ok(raced)
    }

    fn reuse(&self, key: &str) -> Option<Arc<dyn Invoker>> {
        let mut cached = self.entries.get_mut(key)?;
        cached.refs += 1;
        debug!(provider = %key, refs = cached.refs, "Reusing cached invoker");
        Some(Arc::clone(&cached.invoker))
    }

    /// Drops one reference to the invoker cached under `provider_key`.
    ///
    /// Returns true if that was the last reference and the invoker was
    /// destroyed.
    pub fn release(&self, provider_key: &str) -> bool {
        let retired = match self.entries.entry(provider_key.to_owned()) {
            Entry::Occupied(mut entry) => {
                let cached = entry.get_mut();
                cached.refs = cached.refs.saturating_sub(1);
                if cached.refs > 0 {
                    return false;
                }
                entry.remove().invoker
            }
            Entry::Vacant(_) => {
                debug!(provider = %provider_key, "Release of unknown invoker ignored");
                return false;
            }
        };

        retired.destroy();
        info!(provider = %provider_key, "Invoker destroyed");
        true
    }

    /// Number of live invokers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, provider_key: &str) -> bool {
        self.entries.contains_key(provider_key)
    }

    /// Current reference count for `provider_key`, zero if not cached.
    pub fn ref_count(&self, provider_key: &str) -> usize {
        self.entries.get(provider_key).map_or(0, |cached| cached.refs)
    }
}

impl std::fmt::Debug for InvokerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvokerCache")
            .field("invokers", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::test_support::{provider, FakeFactory, FakeInvoker};
    use crate::ClusterError;
    use parking_lot::Mutex;
    use std::sync::{Barrier, OnceLock, Weak};
    use std::thread;

    #[test]
    fn same_provider_shares_one_invoker() {
        let factory = Arc::new(FakeFactory::default());
        let cache = InvokerCache::new(factory.clone());
        let url = provider("10.0.0.1");

        let a = cache.acquire(&url).unwrap();
        let b = cache.acquire(&url).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(factory.created_count(), 1);
        assert_eq!(cache.ref_count(&url.identity_key()), 2);
    }

    #[test]
    fn different_addresses_get_different_invokers() {
        let factory = Arc::new(FakeFactory::default());
        let cache = InvokerCache::new(factory.clone());

        cache.acquire(&provider("10.0.0.1")).unwrap();
        cache.acquire(&provider("10.0.0.2")).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(factory.created_count(), 2);
    }

    #[test]
    fn last_release_destroys_once() {
        let factory = Arc::new(FakeFactory::default());
        let cache = InvokerCache::new(factory.clone());
        let url = provider("10.0.0.1");
        let key = url.identity_key();

        cache.acquire(&url).unwrap();
        cache.acquire(&url).unwrap();

        assert!(!cache.release(&key));
        assert_eq!(factory.created.lock()[0].destroy_count(), 0);

        assert!(cache.release(&key));
        assert_eq!(factory.created.lock()[0].destroy_count(), 1);
        assert!(cache.is_empty());

        assert!(!cache.release(&key));
        assert_eq!(factory.created.lock()[0].destroy_count(), 1);
    }

    #[derive(Default)]
    struct ReentrantFactory {
        cache: OnceLock<Weak<InvokerCache>>,
        seen_len: Mutex<Vec<usize>>,
    }

    impl InvokerFactory for ReentrantFactory {
        fn create(&self, provider: &ServiceUrl) -> Result<Arc<dyn Invoker>> {
            if let Some(cache) = self.cache.get().and_then(Weak::upgrade) {
                self.seen_len.lock().push(cache.len());
            }
            Ok(FakeInvoker::new(provider.clone()))
        }
    }

    #[test]
    fn factory_may_read_the_cache() {
        let factory = Arc::new(ReentrantFactory::default());
        let cache = Arc::new(InvokerCache::new(factory.clone()));
        factory.cache.set(Arc::downgrade(&cache)).unwrap();

        cache.acquire(&provider("10.0.0.1")).unwrap();
        cache.acquire(&provider("10.0.0.2")).unwrap();

        assert_eq!(*factory.seen_len.lock(), vec![0, 1]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn concurrent_acquire_shares_one_invoker() {
        let factory = Arc::new(FakeFactory::default());
        let cache = Arc::new(InvokerCache::new(factory.clone()));
        let url = provider("10.0.0.1");
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let (cache, url, barrier) = (cache.clone(), url.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    cache.acquire(&url).unwrap()
                })
            })
            .collect();
        let acquired: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(acquired.iter().all(|i| Arc::ptr_eq(i, &acquired[0])));
        assert_eq!(cache.ref_count(&url.identity_key()), 8);
        let live = factory
            .created
            .lock()
            .iter()
            .filter(|invoker| invoker.destroy_count() == 0)
            .count();
        assert_eq!(live, 1);
    }

    #[test]
    fn failed_creation_caches_nothing() {
        let cache = InvokerCache::new(Arc::new(FakeFactory::failing()));
        let url = provider("10.0.0.1");

        let err = cache.acquire(&url).unwrap_err();

        assert!(matches!(err, ClusterError::InvokerCreation { .. }));
        assert!(!cache.contains(&url.identity_key()));
    }
}
