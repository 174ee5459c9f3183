//! In-memory registry backend for tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use pinkrpc_common::{Node, ServiceUrl};
use tracing::{debug, info};

use crate::connection::{NotifyListener, RegistryConnection, RegistryFactory};
use crate::error::{RegistryError, Result};

#[derive(Default)]
struct RegistryState {
    /// Service key -> provider identity key -> provider.
    providers: HashMap<String, BTreeMap<String, ServiceUrl>>,
    listeners: HashMap<String, Vec<Arc<dyn NotifyListener>>>,
}

impl RegistryState {
    fn snapshot(&self, service_key: &str) -> Vec<ServiceUrl> {
        self.providers
            .get(service_key)
            .map(|providers| providers.values().cloned().collect())
            .unwrap_or_default()
    }

    fn publish(&self, service_key: &str) {
        let Some(listeners) = self.listeners.get(service_key) else {
            return;
        };
        let providers = self.snapshot(service_key);
        for listener in listeners {
            listener.notify(providers.clone());
        }
    }
}

/// Registry that keeps providers in process memory.
///
/// Providers are grouped by service key and every change is pushed to the
/// subscribers of that key as a complete list. Notifications are delivered
/// in order while the registry lock is held, so listeners must not call back
/// into the registry.
pub struct InMemoryRegistry {
    url: ServiceUrl,
    state: Mutex<RegistryState>,
    destroyed: AtomicBool,
}

impl InMemoryRegistry {
    /// Creates an empty registry identified by `url`.
    #[must_use]
    pub fn new(url: ServiceUrl) -> Self {
        Self {
            url,
            state: Mutex::new(RegistryState::default()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Fresh registry with the same URL and providers, but no subscribers.
    fn reopened(&self) -> Self {
        let providers = self.state.lock().providers.clone();
        Self {
            url: self.url.clone(),
            state: Mutex::new(RegistryState {
                providers,
                listeners: HashMap::new(),
            }),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Adds or replaces a provider and notifies its subscribers.
    pub fn register(&self, provider: ServiceUrl) {
        let service_key = provider.service_key();
        let mut state = self.state.lock();
        info!(service = %service_key, provider = %provider.location(), "Provider registered");
        state
            .providers
            .entry(service_key.clone())
            .or_default()
            .insert(provider.identity_key(), provider);
        state.publish(&service_key);
    }

    /// Parses and registers a provider in its text form.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Url`] if the text is not a valid URL.
    pub fn register_encoded(&self, text: &str) -> Result<()> {
        self.register(ServiceUrl::parse(text)?);
        Ok(())
    }

    /// Removes a provider. Returns false if it was not registered.
    pub fn unregister(&self, provider: &ServiceUrl) -> bool {
        let service_key = provider.service_key();
        let mut state = self.state.lock();
        let removed = state
            .providers
            .get_mut(&service_key)
            .and_then(|providers| providers.remove(&provider.identity_key()))
            .is_some();

        if removed {
            info!(service = %service_key, provider = %provider.location(), "Provider unregistered");
            state.publish(&service_key);
        } else {
            debug!(service = %service_key, "Provider not found for unregistration");
        }
        removed
    }

    /// Providers currently registered under `service_key`.
    pub fn providers(&self, service_key: &str) -> Vec<ServiceUrl> {
        self.state.lock().snapshot(service_key)
    }

    pub fn subscriber_count(&self, service_key: &str) -> usize {
        self.state
            .lock()
            .listeners
            .get(service_key)
            .map_or(0, Vec::len)
    }
}

impl Node for InMemoryRegistry {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.state.lock().listeners.clear();
        info!(registry = %self.url.address(), "Registry connection closed");
    }
}

impl RegistryConnection for InMemoryRegistry {
    fn subscribe(&self, service_key: &str, listener: Arc<dyn NotifyListener>) -> Result<()> {
        let mut state = self.state.lock();
        if !self.is_available() {
            return Err(RegistryError::Subscription {
                service: service_key.to_owned(),
                reason: format!("registry {} is closed", self.url.address()),
            });
        }

        listener.notify(state.snapshot(service_key));
        state
            .listeners
            .entry(service_key.to_owned())
            .or_default()
            .push(listener);
        debug!(service = %service_key, "Subscriber added");
        Ok(())
    }

    fn unsubscribe(&self, service_key: &str, listener: &Arc<dyn NotifyListener>) {
        let mut state = self.state.lock();
        if let Some(listeners) = state.listeners.get_mut(service_key) {
            listeners.retain(|current| !Arc::ptr_eq(current, listener));
            if listeners.is_empty() {
                state.listeners.remove(service_key);
            }
            debug!(service = %service_key, "Subscriber removed");
        }
    }
}

impl std::fmt::Debug for InMemoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryRegistry")
            .field("address", &self.url.address())
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

/// Factory handing out one shared [`InMemoryRegistry`] per registry address.
///
/// Connecting to an address whose registry was destroyed opens a fresh one
/// that keeps the registered providers.
#[derive(Debug, Default)]
pub struct InMemoryRegistryFactory {
    registries: DashMap<String, Arc<InMemoryRegistry>>,
    connects: AtomicUsize,
}

impl InMemoryRegistryFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry currently serving `registry`'s address, created if needed.
    pub fn registry(&self, registry: &ServiceUrl) -> Arc<InMemoryRegistry> {
        let address = registry.address();
        match self.registries.entry(address) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_available() {
                    let fresh = Arc::new(entry.get().reopened());
                    entry.insert(fresh);
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => {
                Arc::clone(entry.insert(Arc::new(InMemoryRegistry::new(registry.clone()))).value())
            }
        }
    }

    /// Number of successful [`connect`](RegistryFactory::connect) calls.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RegistryFactory for InMemoryRegistryFactory {
    async fn connect(&self, registry: &ServiceUrl) -> Result<Arc<dyn RegistryConnection>> {
        let connection = self.registry(registry);
        self.connects.fetch_add(1, Ordering::SeqCst);
        debug!(registry = %registry.address(), "In-memory registry connected");
        Ok(connection)
    }
}
