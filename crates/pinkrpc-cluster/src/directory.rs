//! Directories: the invokers currently usable for a logical service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pinkrpc_common::{Node, ServiceUrl};
use tracing::info;

use crate::invoker::{Invocation, Invoker};

/// Source of invokers for one consumer.
///
/// `list` never fails: an empty vector means no provider can serve the call
/// right now. Implementations must be safe to list while their contents are
/// being replaced in the background.
pub trait Directory: Node {
    /// Returns the invokers able to serve `invocation`.
    fn list(&self, invocation: &Invocation) -> Vec<Arc<dyn Invoker>>;
}

/// Filters `invokers` down to those that can serve `invocation`.
///
/// Unavailable invokers are dropped, as are providers advertising a method
/// list that lacks the invoked method.
pub fn usable_invokers(
    invokers: &[Arc<dyn Invoker>],
    invocation: &Invocation,
) -> Vec<Arc<dyn Invoker>> {
    let method = invocation.method_name();
    invokers
        .iter()
        .filter(|invoker| invoker.is_available())
        .filter(|invoker| method.is_empty() || invoker.url().exposes_method(method))
        .cloned()
        .collect()
}

/// Directory over a fixed set of invokers.
///
/// Used for consumers configured with direct provider addresses.
#[derive(Debug)]
pub struct StaticDirectory {
    url: ServiceUrl,
    invokers: Vec<Arc<dyn Invoker>>,
    destroyed: AtomicBool,
}

impl StaticDirectory {
    #[must_use]
    pub fn new(url: ServiceUrl, invokers: Vec<Arc<dyn Invoker>>) -> Self {
        Self {
            url,
            invokers,
            destroyed: AtomicBool::new(false),
        }
    }
}

impl Node for StaticDirectory {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
            && self.invokers.iter().any(|invoker| invoker.is_available())
    }

    fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        for invoker in &self.invokers {
            invoker.destroy();
        }
        info!(service = %self.url.service_key(), invokers = self.invokers.len(), "Static directory destroyed");
    }
}

impl Directory for StaticDirectory {
    fn list(&self, invocation: &Invocation) -> Vec<Arc<dyn Invoker>> {
        if self.destroyed.load(Ordering::Acquire) {
            return Vec::new();
        }
        usable_invokers(&self.invokers, invocation)
    }
}
