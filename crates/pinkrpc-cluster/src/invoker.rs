//! Invoker handles and the invocation they serve.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use pinkrpc_common::{Node, ServiceUrl};

use crate::error::Result;

/// Handle able to perform remote calls against one provider.
///
/// The cluster layer never calls through an invoker; it only shares,
/// selects and destroys them. The call path belongs to the transport.
pub trait Invoker: Node + fmt::Debug {}

/// Creates invokers for provider URLs. Implemented by the transport.
pub trait InvokerFactory: Send + Sync {
    /// Creates an invoker bound to `provider`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InvokerCreation`](crate::ClusterError::InvokerCreation)
    /// if the transport cannot reach or set up the provider.
    fn create(&self, provider: &ServiceUrl) -> Result<Arc<dyn Invoker>>;
}

/// A single call as seen by directories and load balancers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    method_name: String,
    attachments: BTreeMap<String, String>,
}

impl Invocation {
    /// Creates an invocation of `method_name`.
    #[must_use]
    pub fn new(method_name: impl Into<String>) -> Self {
        Self {
            method_name: method_name.into(),
            attachments: BTreeMap::new(),
        }
    }

    /// Adds an attachment sent alongside the call.
    #[must_use]
    pub fn with_attachment(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attachments.insert(key.into(), value.into());
        self
    }

    /// Method being invoked. Empty when the caller does not name one.
    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn attachment(&self, key: &str) -> Option<&str> {
        self.attachments.get(key).map(String::as_str)
    }

    pub fn attachments(&self) -> &BTreeMap<String, String> {
        &self.attachments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_attachments() {
        let invocation = Invocation::new("sayHello")
            .with_attachment("trace", "abc")
            .with_attachment("trace", "def");

        assert_eq!(invocation.method_name(), "sayHello");
        assert_eq!(invocation.attachment("trace"), Some("def"));
        assert_eq!(invocation.attachment("missing"), None);
        assert_eq!(invocation.attachments().len(), 1);
    }

    #[test]
    fn default_invocation_names_no_method() {
        assert!(Invocation::default().method_name().is_empty());
    }
}
