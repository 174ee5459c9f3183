//! Lifecycle capability shared by every live cluster resource.

use crate::ServiceUrl;

/// A live resource taking part in the cluster.
///
/// Invokers, directories and registry connections all implement this so the
/// registry protocol can health-check and tear them down uniformly.
pub trait Node: Send + Sync {
    /// The URL this resource is bound to.
    fn url(&self) -> &ServiceUrl;

    /// Returns true while the resource can serve requests.
    fn is_available(&self) -> bool;

    /// Releases the resource.
    ///
    /// Implementations must tolerate being called more than once.
    fn destroy(&self);
}
