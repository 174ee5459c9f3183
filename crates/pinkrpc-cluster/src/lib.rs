//! Consumer-side cluster primitives for pinkrpc.
//!
//! Everything between "which providers exist" and "which one gets this call":
//!
//! - **Invokers**: [`Invoker`] handles created by the transport through an
//!   [`InvokerFactory`], shared and reference-counted by [`InvokerCache`]
//! - **Directories**: [`Directory`] yields the invokers usable for an
//!   [`Invocation`]; [`StaticDirectory`] serves a fixed list
//! - **Load balancing**: [`LoadBalance`] picks exactly one invoker, with
//!   weighted random and round-robin policies
//! - **Configuration**: [`ClusterConfig`] selects the policy and its defaults

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod invoker;
pub mod loadbalance;

#[cfg(test)]
mod test_support;

pub use cache::InvokerCache;
pub use config::{ClusterConfig, ConfigError};
pub use directory::{Directory, StaticDirectory};
pub use error::{ClusterError, Result};
pub use invoker::{Invocation, Invoker, InvokerFactory};
pub use loadbalance::{LoadBalance, LoadBalanceKind, RandomLoadBalance, RoundRobinLoadBalance};
