//! Error types for cluster operations.

use thiserror::Error;

/// Cluster errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClusterError {
    /// Selection was asked to choose from an empty invoker list.
    #[error("no available invoker for method {0:?}")]
    NoAvailableInvoker(String),

    /// The transport could not create an invoker for a provider.
    #[error("failed to create invoker for {url}: {reason}")]
    InvokerCreation { url: String, reason: String },
}

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;
