//! Load balancing policies.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use pinkrpc_common::constants::{
    DEFAULT_WARMUP, DEFAULT_WEIGHT, TIMESTAMP_KEY, WARMUP_KEY, WEIGHT_KEY,
};
use pinkrpc_common::ServiceUrl;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::error::{ClusterError, Result};
use crate::invoker::{Invocation, Invoker};

/// Picks one invoker for a call.
pub trait LoadBalance: Send + Sync + fmt::Debug {
    /// Selects an element of `invokers`.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::NoAvailableInvoker`] if `invokers` is empty.
    fn select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>>;

    /// Returns the policy name.
    fn name(&self) -> &'static str;
}

/// Weight a provider carries at `now_secs` (unix seconds).
///
/// The `weight` parameter applies as-is unless the provider advertises a
/// start `timestamp` and is still inside its `warmup` window, in which case
/// the weight ramps linearly with uptime and never drops below 1.
pub fn effective_weight(
    url: &ServiceUrl,
    now_secs: i64,
    default_weight: u64,
    default_warmup: Duration,
) -> u64 {
    let weight = url.param_u64(WEIGHT_KEY, default_weight);
    let started = url.param_i64(TIMESTAMP_KEY, 0);
    if weight == 0 || started <= 0 {
        return weight;
    }

    let warmup = url.param_u64(WARMUP_KEY, default_warmup.as_secs());
    let Ok(uptime) = u64::try_from(now_secs.saturating_sub(started)) else {
        return weight;
    };
    if uptime == 0 || uptime >= warmup {
        return weight;
    }

    let ramped = u128::from(weight) * u128::from(uptime) / u128::from(warmup);
    u64::try_from(ramped).unwrap_or(weight).max(1)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_secs()).unwrap_or(i64::MAX))
}

fn no_invoker(invocation: &Invocation) -> ClusterError {
    ClusterError::NoAvailableInvoker(invocation.method_name().to_owned())
}

/// Weighted random selection with warm-up.
///
/// When every candidate carries the same weight the pick is uniform,
/// otherwise it is proportional to each candidate's effective weight.
pub struct RandomLoadBalance {
    rng: Mutex<SmallRng>,
    default_weight: u64,
    default_warmup: Duration,
}

impl RandomLoadBalance {
    /// Creates a policy seeded from entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(SmallRng::from_entropy())
    }

    /// Creates a policy with a fixed seed, for reproducible selections.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(SmallRng::seed_from_u64(seed))
    }

    fn from_rng(rng: SmallRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            default_weight: DEFAULT_WEIGHT,
            default_warmup: DEFAULT_WARMUP,
        }
    }

    /// Overrides the weight and warm-up used for providers that do not
    /// advertise their own.
    #[must_use]
    pub fn with_defaults(mut self, weight: u64, warmup: Duration) -> Self {
        self.default_weight = weight;
        self.default_warmup = warmup;
        self
    }

    fn pick(&self, invokers: &[Arc<dyn Invoker>], now_secs: i64) -> usize {
        let weights: Vec<u64> = invokers
            .iter()
            .map(|invoker| {
                effective_weight(invoker.url(), now_secs, self.default_weight, self.default_warmup)
            })
            .collect();
        let uniform = weights.windows(2).all(|pair| pair[0] == pair[1]);
        let total = weights.iter().try_fold(0u64, |sum, w| sum.checked_add(*w));

        let mut rng = self.rng.lock();
        if let (false, Some(total)) = (uniform, total) {
            if total > 0 {
                let mut offset = rng.gen_range(0..total);
                for (index, weight) in weights.iter().enumerate() {
                    if offset < *weight {
                        return index;
                    }
                    offset -= weight;
                }
            }
        }
        rng.gen_range(0..invokers.len())
    }
}

impl Default for RandomLoadBalance {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RandomLoadBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RandomLoadBalance")
            .field("default_weight", &self.default_weight)
            .field("default_warmup", &self.default_warmup)
            .finish_non_exhaustive()
    }
}

impl LoadBalance for RandomLoadBalance {
    fn select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>> {
        match invokers {
            [] => Err(no_invoker(invocation)),
            [only] => Ok(Arc::clone(only)),
            _ => Ok(Arc::clone(&invokers[self.pick(invokers, unix_now())])),
        }
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

/// Round-robin selection.
///
/// Keeps one counter per service and method, so unrelated services do not
/// disturb each other's rotation.
#[derive(Debug, Default)]
pub struct RoundRobinLoadBalance {
    counters: DashMap<String, AtomicU64>,
}

impl RoundRobinLoadBalance {
    #[must_use]
    pub fn new() -> Self {
        Self {
            counters: DashMap::new(),
        }
    }
}

impl LoadBalance for RoundRobinLoadBalance {
    fn select(
        &self,
        invokers: &[Arc<dyn Invoker>],
        invocation: &Invocation,
    ) -> Result<Arc<dyn Invoker>> {
        let Some(first) = invokers.first() else {
            return Err(no_invoker(invocation));
        };

        let key = format!("{}#{}", first.url().service_key(), invocation.method_name());
        let counter = self.counters.entry(key).or_insert_with(|| AtomicU64::new(0));
        let turn = counter.fetch_add(1, Ordering::Relaxed);

        let len = u64::try_from(invokers.len()).unwrap_or(u64::MAX);
        let index = usize::try_from(turn % len).unwrap_or(0);
        Ok(Arc::clone(&invokers[index]))
    }

    fn name(&self) -> &'static str {
        "round_robin"
    }
}

/// Configurable load balancing policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceKind {
    /// Weighted random with warm-up.
    #[default]
    Random,
    /// Per service and method rotation.
    RoundRobin,
}

impl LoadBalanceKind {
    /// Builds a fresh policy of this kind with library defaults.
    pub fn build(self) -> Arc<dyn LoadBalance> {
        match self {
            Self::Random => Arc::new(RandomLoadBalance::new()),
            Self::RoundRobin => Arc::new(RoundRobinLoadBalance::new()),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "round_robin",
        }
    }
}

impl fmt::Display for LoadBalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
