//! Directory driven by a registry subscription.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use pinkrpc_cluster::directory::usable_invokers;
use pinkrpc_cluster::{Directory, Invocation, Invoker, InvokerCache};
use pinkrpc_common::{Node, ServiceUrl};
use tracing::{debug, info, warn};

use crate::connection::{NotifyListener, RegistryConnection};
use crate::error::Result;

/// Invokers of the providers a registry currently reports for one consumer.
///
/// Each provider list pushed by the registry replaces the whole snapshot at
/// once, so [`list`](Directory::list) always sees either the old or the new
/// set, never a mix. Invokers are borrowed from the shared [`InvokerCache`]
/// and handed back when their provider disappears or the directory is
/// destroyed.
pub struct RegistryDirectory {
    consumer: ServiceUrl,
    service_key: String,
    registry: Arc<dyn RegistryConnection>,
    cache: Arc<InvokerCache>,
    snapshot: ArcSwap<Vec<Arc<dyn Invoker>>>,
    /// Provider keys held in the cache. Also serialises refreshes.
    held: Mutex<Vec<String>>,
    destroyed: AtomicBool,
    me: Weak<Self>,
}

impl RegistryDirectory {
    /// Creates a directory for `consumer` and subscribes it to `registry`.
    ///
    /// # Errors
    ///
    /// Returns the registry's error if the subscription is refused. Anything
    /// delivered before the refusal is released again.
    pub fn subscribe(
        consumer: ServiceUrl,
        registry: Arc<dyn RegistryConnection>,
        cache: Arc<InvokerCache>,
    ) -> Result<Arc<Self>> {
        let service_key = consumer.service_key();
        let directory = Arc::new_cyclic(|me| Self {
            consumer,
            service_key,
            registry,
            cache,
            snapshot: ArcSwap::from_pointee(Vec::new()),
            held: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
            me: Weak::clone(me),
        });

        let listener: Arc<dyn NotifyListener> = directory.clone();
        if let Err(err) = directory.registry.subscribe(&directory.service_key, listener) {
            warn!(service = %directory.service_key, error = %err, "Subscription refused");
            directory.destroy();
            return Err(err);
        }

        debug!(service = %directory.service_key, "Directory subscribed");
        Ok(directory)
    }

    /// Key this directory subscribes with.
    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    /// Current invoker snapshot, unfiltered.
    pub fn invokers(&self) -> Arc<Vec<Arc<dyn Invoker>>> {
        self.snapshot.load_full()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn release_all(&self, keys: Vec<String>) {
        for key in keys {
            self.cache.release(&key);
        }
    }
}

impl NotifyListener for RegistryDirectory {
    fn notify(&self, providers: Vec<ServiceUrl>) {
        let mut held = self.held.lock();
        if self.is_destroyed() {
            debug!(service = %self.service_key, "Notification after destroy ignored");
            return;
        }

        let offered = providers.len();
        let mut seen = HashSet::new();
        let mut keys = Vec::new();
        let mut invokers = Vec::new();

        for provider in providers {
            if !self.consumer.equals_ignoring_address(&provider) {
                continue;
            }
            let key = provider.identity_key();
            if !seen.insert(key.clone()) {
                continue;
            }
            match self.cache.acquire(&provider) {
                Ok(invoker) => {
                    keys.push(key);
                    invokers.push(invoker);
                }
                Err(err) => {
                    warn!(service = %self.service_key, provider = %key, error = %err, "Skipping provider");
                }
            }
        }

        let count = invokers.len();
        self.snapshot.store(Arc::new(invokers));
        let previous = std::mem::replace(&mut *held, keys);
        self.release_all(previous);

        info!(service = %self.service_key, offered, providers = count, "Directory refreshed");
    }
}

impl Node for RegistryDirectory {
    fn url(&self) -> &ServiceUrl {
        &self.consumer
    }

    fn is_available(&self) -> bool {
        !self.is_destroyed() && self.snapshot.load().iter().any(|invoker| invoker.is_available())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(me) = self.me.upgrade() {
            let listener: Arc<dyn NotifyListener> = me;
            self.registry.unsubscribe(&self.service_key, &listener);
        }

        let mut held = self.held.lock();
        self.snapshot.store(Arc::new(Vec::new()));
        let previous = std::mem::take(&mut *held);
        self.release_all(previous);

        info!(service = %self.service_key, "Directory destroyed");
    }
}

impl Directory for RegistryDirectory {
    fn list(&self, invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        usable_invokers(&self.snapshot.load(), invocation)
    }
}

impl std::fmt::Debug for RegistryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDirectory")
            .field("service_key", &self.service_key)
            .field("invokers", &self.snapshot.load().len())
            .field("destroyed", &self.is_destroyed())
            .finish_non_exhaustive()
    }
}
