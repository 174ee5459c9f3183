//! Error types for service URL handling.

use thiserror::Error;

/// Errors produced while parsing or building a [`ServiceUrl`](crate::ServiceUrl).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The text could not be unescaped, parsed as a URL, or its query split
    /// into key/value pairs.
    #[error("malformed url: {0}")]
    MalformedUrl(String),

    /// The authority contains a colon but is not a valid `host:port`.
    #[error("malformed address: {0}")]
    MalformedAddress(String),
}

/// Result type for URL operations.
pub type Result<T> = std::result::Result<T, UrlError>;
