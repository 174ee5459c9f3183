//! Registry protocol: shared registry connections and per-consumer bindings.

use std::sync::Arc;

use pinkrpc_cluster::{Invoker, InvokerCache, InvokerFactory};
use pinkrpc_common::{Node, ServiceUrl};
use tracing::{debug, info, warn};

use crate::connection::{RegistryConnection, RegistryFactory};
use crate::directory::RegistryDirectory;
use crate::error::{RegistryError, Result};
use crate::slots::{RefCountedMap, Released};

/// A consumer bound to its directory.
struct Binding {
    directory: Arc<RegistryDirectory>,
    registry_address: String,
}

/// Resolves consumers to live invokers through their registries.
///
/// At most one registry connection is open per registry address and at most
/// one [`RegistryDirectory`] exists per consumer identity key, however many
/// times a consumer is resolved. Both are reference-counted: the matching
/// number of [`release`](Self::release) calls tears them down again.
pub struct RegistryProtocol {
    registry_factory: Arc<dyn RegistryFactory>,
    invokers: Arc<InvokerCache>,
    registries: RefCountedMap<dyn RegistryConnection>,
    bounds: RefCountedMap<Binding>,
}

impl RegistryProtocol {
    /// Creates a protocol opening registries with `registry_factory` and
    /// invokers with `invoker_factory`.
    #[must_use]
    pub fn new(
        registry_factory: Arc<dyn RegistryFactory>,
        invoker_factory: Arc<dyn InvokerFactory>,
    ) -> Self {
        Self {
            registry_factory,
            invokers: Arc::new(InvokerCache::new(invoker_factory)),
            registries: RefCountedMap::new(),
            bounds: RefCountedMap::new(),
        }
    }

    /// Returns the invokers currently serving `consumer`, binding it on first
    /// use.
    ///
    /// An empty list means the registry knows no matching provider yet; the
    /// binding stays and fills in as providers appear.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::MissingRegistry`] if no registry is attached to
    ///   `consumer`
    /// - [`RegistryError::Connection`] if the registry cannot be reached
    /// - [`RegistryError::Subscription`] if the registry refuses the watch
    ///
    /// A failed resolve leaves no connection or binding behind.
    pub async fn resolve(&self, consumer: &ServiceUrl) -> Result<Vec<Arc<dyn Invoker>>> {
        let registry_url = consumer
            .registry()
            .ok_or_else(|| RegistryError::MissingRegistry(consumer.service_key()))?;
        let key = consumer.identity_key();

        let binding = self
            .bounds
            .acquire(&key, || self.bind(consumer, registry_url))
            .await?;
        if !binding.created {
            let requested = registry_url.address();
            if binding.value.registry_address == requested {
                debug!(consumer = %key, "Reusing bound directory");
            } else {
                warn!(
                    consumer = %key,
                    bound = %binding.value.registry_address,
                    requested = %requested,
                    "Consumer already bound through another registry, ignoring the requested one"
                );
            }
        }

        Ok(binding.value.directory.invokers().to_vec())
    }

    async fn bind(&self, consumer: &ServiceUrl, registry_url: &ServiceUrl) -> Result<Arc<Binding>> {
        let address = registry_url.address();
        let registry = self
            .registries
            .acquire(&address, || self.connect(registry_url, &address))
            .await?
            .value;

        match RegistryDirectory::subscribe(consumer.clone(), registry, Arc::clone(&self.invokers)) {
            Ok(directory) => {
                info!(consumer = %consumer.identity_key(), registry = %address, "Consumer bound");
                Ok(Arc::new(Binding {
                    directory,
                    registry_address: address,
                }))
            }
            Err(err) => {
                self.release_registry(&address).await;
                Err(err)
            }
        }
    }

    async fn connect(
        &self,
        registry_url: &ServiceUrl,
        address: &str,
    ) -> Result<Arc<dyn RegistryConnection>> {
        let connection = self.registry_factory.connect(registry_url).await?;
        info!(registry = %address, "Registry connection created");
        Ok(connection)
    }

    async fn release_registry(&self, address: &str) {
        let released = self
            .registries
            .release(address, |connection| connection.destroy())
            .await;
        match released {
            Released::Last(_) => {
                info!(registry = %address, "Registry connection destroyed");
            }
            Released::Retained(refs) => {
                debug!(registry = %address, refs, "Registry connection still in use");
            }
            Released::Unknown => {}
        }
    }

    /// Drops one reference to `consumer`'s binding.
    ///
    /// The last release destroys the directory, handing its invokers back,
    /// and closes the registry connection if no other binding uses it.
    /// Returns true if the binding was torn down.
    pub async fn release(&self, consumer: &ServiceUrl) -> bool {
        let key = consumer.identity_key();
        let released = self
            .bounds
            .release(&key, |binding| binding.directory.destroy())
            .await;
        match released {
            Released::Last(binding) => {
                self.release_registry(&binding.registry_address).await;
                info!(consumer = %key, "Consumer unbound");
                true
            }
            Released::Retained(refs) => {
                debug!(consumer = %key, refs, "Binding still in use");
                false
            }
            Released::Unknown => {
                debug!(consumer = %key, "Release of unbound consumer ignored");
                false
            }
        }
    }

    /// Tears down every binding, then every registry connection.
    ///
    /// Each directory and connection is destroyed exactly once. Calling this
    /// again, or on an empty protocol, does nothing.
    pub async fn destroy_all(&self) {
        let bindings = self.bounds.drain().await;
        let connections = self.registries.drain().await;
        if bindings.is_empty() && connections.is_empty() {
            return;
        }

        for binding in &bindings {
            binding.directory.destroy();
        }
        for connection in &connections {
            connection.destroy();
        }
        info!(
            bindings = bindings.len(),
            registries = connections.len(),
            "Registry protocol destroyed"
        );
    }

    /// Directory bound to `consumer`, if any.
    pub async fn directory(&self, consumer: &ServiceUrl) -> Option<Arc<RegistryDirectory>> {
        self.bounds
            .get(&consumer.identity_key())
            .await
            .map(|binding| Arc::clone(&binding.directory))
    }

    /// Number of outstanding resolves for `consumer`.
    pub async fn ref_count(&self, consumer: &ServiceUrl) -> usize {
        self.bounds.refs(&consumer.identity_key()).await
    }

    /// Number of bound consumers.
    pub fn bound_count(&self) -> usize {
        self.bounds.len()
    }

    /// Number of open registry connections.
    pub fn registry_count(&self) -> usize {
        self.registries.len()
    }

    /// Number of live invokers across all bindings.
    pub fn invoker_count(&self) -> usize {
        self.invokers.len()
    }
}

impl std::fmt::Debug for RegistryProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryProtocol")
            .field("bounds", &self.bounds.len())
            .field("registries", &self.registries.len())
            .field("invokers", &self.invokers)
            .finish_non_exhaustive()
    }
}
