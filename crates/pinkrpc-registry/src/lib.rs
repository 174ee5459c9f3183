//! Registry protocol for pinkrpc consumers.
//!
//! Turns a consumer [`ServiceUrl`](pinkrpc_common::ServiceUrl) into the live
//! invokers of the providers that match it, without ever opening the same
//! registry twice or subscribing the same consumer twice:
//!
//! - **Backends**: [`RegistryFactory`] opens a [`RegistryConnection`], which
//!   pushes provider lists to a [`NotifyListener`]
//! - **Directories**: [`RegistryDirectory`] follows one subscription and keeps
//!   an atomically swapped invoker snapshot
//! - **Protocol**: [`RegistryProtocol`] reference-counts registry connections
//!   per address and directories per consumer identity
//! - **In-memory backend**: [`InMemoryRegistry`] for tests and single-process
//!   deployments

pub mod connection;
pub mod directory;
pub mod error;
pub mod memory;
pub mod protocol;
mod slots;

pub use connection::{NotifyListener, RegistryConnection, RegistryFactory};
pub use directory::RegistryDirectory;
pub use error::{RegistryError, Result};
pub use memory::{InMemoryRegistry, InMemoryRegistryFactory};
pub use protocol::RegistryProtocol;
