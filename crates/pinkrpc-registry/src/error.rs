//! Error types for the registry protocol.

use pinkrpc_common::UrlError;
use thiserror::Error;

/// Registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry backend could not be reached.
    #[error("failed to connect to registry {address}: {reason}")]
    Connection { address: String, reason: String },

    /// The consumer has no registry attached to resolve through.
    #[error("no registry configured for consumer {0}")]
    MissingRegistry(String),

    /// The registry refused the subscription.
    #[error("failed to subscribe to {service}: {reason}")]
    Subscription { service: String, reason: String },

    /// A URL received from the registry could not be parsed.
    #[error(transparent)]
    Url(#[from] UrlError),
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
