//! Fakes shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use pinkrpc_common::{Node, ServiceUrl};

use crate::error::{ClusterError, Result};
use crate::invoker::{Invoker, InvokerFactory};

#[derive(Debug)]
pub struct FakeInvoker {
    url: ServiceUrl,
    available: AtomicBool,
    destroyed: AtomicUsize,
}

impl FakeInvoker {
    pub fn new(url: ServiceUrl) -> Arc<Self> {
        Arc::new(Self {
            url,
            available: AtomicBool::new(true),
            destroyed: AtomicUsize::new(0),
        })
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn destroy_count(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Node for FakeInvoker {
    fn url(&self) -> &ServiceUrl {
        &self.url
    }

    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn destroy(&self) {
        self.available.store(false, Ordering::SeqCst);
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

impl Invoker for FakeInvoker {}

#[derive(Debug, Default)]
pub struct FakeFactory {
    pub created: Mutex<Vec<Arc<FakeInvoker>>>,
    pub fail: bool,
}

impl FakeFactory {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn created_count(&self) -> usize {
        self.created.lock().len()
    }
}

impl InvokerFactory for FakeFactory {
    fn create(&self, provider: &ServiceUrl) -> Result<Arc<dyn Invoker>> {
        if self.fail {
            return Err(ClusterError::InvokerCreation {
                url: provider.to_string(),
                reason: "connection refused".to_owned(),
            });
        }
        let invoker = FakeInvoker::new(provider.clone());
        self.created.lock().push(Arc::clone(&invoker));
        Ok(invoker)
    }
}

pub fn provider(host: &str) -> ServiceUrl {
    ServiceUrl::builder("com.x.Foo")
        .protocol("pink")
        .ip(host)
        .port("20880")
        .build()
}

pub fn weighted_provider(host: &str, weight: u64) -> ServiceUrl {
    provider(host)
        .to_builder()
        .param(pinkrpc_common::constants::WEIGHT_KEY, weight.to_string())
        .build()
}

pub fn invokers(urls: impl IntoIterator<Item = ServiceUrl>) -> Vec<Arc<dyn Invoker>> {
    urls.into_iter()
        .map(|url| {
            let invoker: Arc<dyn Invoker> = FakeInvoker::new(url);
            invoker
        })
        .collect()
}

pub fn as_dyn(items: Vec<Arc<FakeInvoker>>) -> Vec<Arc<dyn Invoker>> {
    items
        .into_iter()
        .map(|invoker| -> Arc<dyn Invoker> { invoker })
        .collect()
}
