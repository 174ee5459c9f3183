//! Common types for pinkrpc.
//!
//! This crate holds the pieces every other pinkrpc crate builds on:
//!
//! - **Service URLs**: [`ServiceUrl`], the addressable identity of a provider or
//!   the contract a consumer wants, with its identity key and text form
//! - **Node lifecycle**: the [`Node`] trait shared by invokers, directories and
//!   registry connections
//! - **Constants**: default values and well-known parameter keys

pub mod constants;
pub mod error;
pub mod node;
pub mod url;

pub use error::{Result, UrlError};
pub use node::Node;
pub use self::url::{ServiceUrl, ServiceUrlBuilder};
