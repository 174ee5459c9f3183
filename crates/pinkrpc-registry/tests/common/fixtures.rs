//! URL fixtures for registry protocol integration tests.

#![allow(clippy::expect_used)]

use pinkrpc_common::constants::{GROUP_KEY, VERSION_KEY};
use pinkrpc_common::ServiceUrl;

pub const REGISTRY: &str = "memory://127.0.0.1:2181";
pub const OTHER_REGISTRY: &str = "memory://127.0.0.1:2182";

pub fn registry_url(text: &str) -> ServiceUrl {
    ServiceUrl::parse(text).expect("valid registry url")
}

/// Builder for consumer and provider URLs of one service.
pub struct ServiceBuilder {
    service: String,
    group: Option<String>,
    version: Option<String>,
}

impl ServiceBuilder {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_owned(),
            group: None,
            version: None,
        }
    }

    pub fn with_group(mut self, group: &str) -> Self {
        self.group = Some(group.to_owned());
        self
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_owned());
        self
    }

    fn base(&self) -> pinkrpc_common::ServiceUrlBuilder {
        let mut builder = ServiceUrl::builder(&self.service).protocol("pink");
        if let Some(group) = &self.group {
            builder = builder.param(GROUP_KEY, group.clone());
        }
        if let Some(version) = &self.version {
            builder = builder.param(VERSION_KEY, version.clone());
        }
        builder
    }

    /// Consumer resolving through the registry at `registry`.
    pub fn consumer(&self, registry: &str) -> ServiceUrl {
        self.base().registry(registry_url(registry)).build()
    }

    /// Provider listening on `host:20880`.
    pub fn provider(&self, host: &str) -> ServiceUrl {
        self.base().ip(host).port("20880").build()
    }
}

pub fn foo() -> ServiceBuilder {
    ServiceBuilder::new("com.x.Foo")
}

pub fn bar() -> ServiceBuilder {
    ServiceBuilder::new("com.x.Bar")
}
