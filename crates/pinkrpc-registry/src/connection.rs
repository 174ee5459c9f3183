//! Capabilities a registry backend provides.

use std::sync::Arc;

use async_trait::async_trait;
use pinkrpc_common::{Node, ServiceUrl};

use crate::error::Result;

/// Receives provider lists pushed by a registry.
pub trait NotifyListener: Send + Sync {
    /// Replaces the listener's view with `providers`, the complete current
    /// provider list for the subscribed service.
    fn notify(&self, providers: Vec<ServiceUrl>);
}

/// Live session with one registry.
///
/// [`Node::url`] is the registry's own URL.
pub trait RegistryConnection: Node {
    /// Starts delivering the provider list of `service_key` to `listener`.
    ///
    /// The current list must be delivered before or shortly after this
    /// returns, and again after every change.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Subscription`](crate::RegistryError::Subscription)
    /// if the registry refuses the watch.
    fn subscribe(&self, service_key: &str, listener: Arc<dyn NotifyListener>) -> Result<()>;

    /// Stops delivering to `listener`. Unknown subscriptions are ignored.
    fn unsubscribe(&self, service_key: &str, listener: &Arc<dyn NotifyListener>);
}

/// Opens registry connections.
#[async_trait]
pub trait RegistryFactory: Send + Sync {
    /// Connects to the registry described by `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Connection`](crate::RegistryError::Connection)
    /// if the registry cannot be reached.
    async fn connect(&self, registry: &ServiceUrl) -> Result<Arc<dyn RegistryConnection>>;
}
