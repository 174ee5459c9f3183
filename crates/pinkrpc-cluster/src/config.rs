//! Cluster configuration with layered loading.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::{Error as FigmentError, Figment};
use pinkrpc_common::constants::{DEFAULT_WARMUP, DEFAULT_WEIGHT};
use serde::Deserialize;
use thiserror::Error;

use crate::loadbalance::{LoadBalance, LoadBalanceKind, RandomLoadBalance, RoundRobinLoadBalance};

/// Errors that can occur when loading or parsing cluster configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error from the Figment configuration library.
    #[error("Configuration error: {0}")]
    Figment(Box<FigmentError>),

    /// The configuration parsed but holds unusable values.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<FigmentError> for ConfigError {
    fn from(err: FigmentError) -> Self {
        Self::Figment(Box::new(err))
    }
}

/// Consumer-side cluster settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Load balancing policy.
    pub loadbalance: LoadBalanceKind,

    /// Weight of providers that do not advertise one.
    pub default_weight: u64,

    /// Warm-up window of providers that do not advertise one.
    #[serde(deserialize_with = "deserialize_duration")]
    pub warmup: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            loadbalance: LoadBalanceKind::default(),
            default_weight: default_weight(),
            warmup: default_warmup(),
        }
    }
}

const fn default_weight() -> u64 {
    DEFAULT_WEIGHT
}

const fn default_warmup() -> Duration {
    DEFAULT_WARMUP
}

impl ClusterConfig {
    /// Loads configuration from the default path (`pinkrpc.toml`).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("pinkrpc.toml")
    }

    /// Loads configuration from the specified file path.
    ///
    /// A missing file leaves every setting at its default. Environment
    /// variables prefixed with `PINKRPC_` override file settings.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let figment = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("PINKRPC_").split("__"));

        figment.extract::<Self>()?.validated()
    }

    /// Parses configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let figment = Figment::new().merge(Toml::string(content));
        figment.extract::<Self>()?.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.default_weight == 0 {
            return Err(ConfigError::Invalid(
                "default_weight must be greater than zero".to_owned(),
            ));
        }
        Ok(self)
    }

    /// Builds the configured load balancing policy.
    pub fn load_balance(&self) -> Arc<dyn LoadBalance> {
        match self.loadbalance {
            LoadBalanceKind::Random => Arc::new(
                RandomLoadBalance::new().with_defaults(self.default_weight, self.warmup),
            ),
            LoadBalanceKind::RoundRobin => Arc::new(RoundRobinLoadBalance::new()),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Secs(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let number = |digits: &str| -> Result<u64, String> {
        digits
            .trim()
            .parse()
            .map_err(|_| format!("Invalid duration: {s}"))
    };

    if let Some(ms) = s.strip_suffix("ms") {
        Ok(Duration::from_millis(number(ms)?))
    } else if let Some(secs) = s.strip_suffix('s') {
        Ok(Duration::from_secs(number(secs)?))
    } else if let Some(mins) = s.strip_suffix('m') {
        let mins = number(mins)?;
        mins.checked_mul(60)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("Invalid duration: {s}"))
    } else {
        Ok(Duration::from_secs(number(s)?))
    }
}
