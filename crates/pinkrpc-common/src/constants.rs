//! Default values and well-known parameter keys.

use std::time::Duration;

/// Weight of a provider that does not advertise one.
pub const DEFAULT_WEIGHT: u64 = 100;

/// Warm-up window applied to providers that do not advertise one.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(10 * 60);

pub const DEFAULT_LOADBALANCE: &str = "random";
pub const DEFAULT_RETRIES: u32 = 2;
pub const DEFAULT_PROTOCOL: &str = "pink";
pub const DEFAULT_VERSION: &str = "1.0.0";
pub const DEFAULT_REG_TIMEOUT: &str = "10s";
pub const DEFAULT_CLUSTER: &str = "failover";

/// Explicit interface name, overriding the one derived from the path.
pub const INTERFACE_KEY: &str = "interface";
pub const GROUP_KEY: &str = "group";
pub const VERSION_KEY: &str = "version";
pub const WEIGHT_KEY: &str = "weight";
/// Warm-up window in seconds.
pub const WARMUP_KEY: &str = "warmup";
/// Provider start time in unix seconds.
pub const TIMESTAMP_KEY: &str = "timestamp";
