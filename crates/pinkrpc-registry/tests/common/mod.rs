//! Common test utilities for registry protocol integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use pinkrpc_cluster::{ClusterError, Invoker, InvokerFactory};
use pinkrpc_common::{Node, ServiceUrl};
use pinkrpc_registry::{
    InMemoryRegistry, InMemoryRegistryFactory, RegistryConnection, RegistryError, RegistryFactory,
    RegistryProtocol,
};

/// Invoker that records how often it was destroyed.
#[derive(Debug)]
pub struct CountingInvoker {
    url: ServiceUrl,
    destroyed: AtomicUsize,
}

impl CountingInvoker {
    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Node for CountingInvoker {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    fn is_available(&self) -> bool {
        self.destroy_count() == 0
    }

    fn destroy(&self) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Invoker for CountingInvoker {}

/// Invoker factory keeping every invoker it created.
#[derive(Debug, Default)]
pub struct CountingInvokerFactory {
    created: Mutex<Vec<Arc<CountingInvoker>>>,
}

impl CountingInvokerFactory {
    pub fn created(&self) -> Vec<Arc<CountingInvoker>> {
        self.created.lock().clone()
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl InvokerFactory for CountingInvokerFactory {
    fn create(&self, provider: &ServiceUrl) -> Result<Arc<dyn Invoker>, ClusterError> {
        let invoker = Arc::new(CountingInvoker {
            url: provider.clone(),
            destroyed: AtomicUsize::new(0),
        });
        self.created.lock().push(Arc::clone(&invoker));
        Ok(invoker)
    }
}

/// Registry factory over [`InMemoryRegistryFactory`] that can be slowed down
/// or made unreachable.
#[derive(Debug, Default)]
pub struct ControlledRegistryFactory {
    inner: InMemoryRegistryFactory,
    unreachable: AtomicBool,
    closed_on_connect: AtomicBool,
    delay: Mutex<Option<Duration>>,
    attempts: AtomicUsize,
}

impl ControlledRegistryFactory {
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Hands out connections that are already closed, so subscribing fails.
    pub fn set_closed_on_connect(&self, closed: bool) {
        self.closed_on_connect.store(closed, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of connect calls, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> usize {
        self.inner.connect_count()
    }

    pub fn registry(&self, registry: &ServiceUrl) -> Arc<InMemoryRegistry> {
        self.inner.registry(registry)
    }
}

#[async_trait]
impl RegistryFactory for ControlledRegistryFactory {
    async fn connect(
        &self,
        registry: &ServiceUrl,
    ) -> Result<Arc<dyn RegistryConnection>, RegistryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RegistryError::Connection {
                address: registry.address(),
                reason: "connection refused".to_owned(),
            });
        }
        let connection = self.inner.connect(registry).await?;
        if self.closed_on_connect.load(Ordering::SeqCst) {
            connection.destroy();
        }
        Ok(connection)
    }
}

/// Protocol wired to controllable fakes.
pub struct TestProtocol {
    pub protocol: Arc<RegistryProtocol>,
    pub registries: Arc<ControlledRegistryFactory>,
    pub invokers: Arc<CountingInvokerFactory>,
}

impl TestProtocol {
    pub fn new() -> Self {
        let registries = Arc::new(ControlledRegistryFactory::default());
        let invokers = Arc::new(CountingInvokerFactory::default());
        let protocol = Arc::new(RegistryProtocol::new(registries.clone(), invokers.clone()));
        Self {
            protocol,
            registries,
            invokers,
        }
    }

    /// Registers `provider` with the registry at `registry`.
    pub fn register(&self, registry: &ServiceUrl, provider: ServiceUrl) {
        self.registries.registry(registry).register(provider);
    }
}

impl Default for TestProtocol {
    fn default() -> Self {
        Self::new()
    }
}
