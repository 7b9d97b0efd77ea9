use crate::clock::as_millis;
use crate::config_validator::ConfigValidator;
use crate::error::ConfigError;
use envconfig::Envconfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Quota class used for any class without its own entry.
pub const DEFAULT_QUOTA_CLASS: &str = "default";

/// Smallest window the millisecond timestamps can express.
pub const MIN_WINDOW_SIZE: Duration = Duration::from_millis(1);

/// Largest accepted window. Keeps the key TTL and millisecond math well
/// inside `u64`.
pub const MAX_WINDOW_SIZE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Shared store URL; empty runs the limiter in local-only mode
    #[envconfig(from = "REDIS_URL", default = "")]
    pub redis_url: String,

    /// Sliding window length in seconds, shared by every quota class
    #[envconfig(from = "RATE_LIMIT_WINDOW_SECS", default = "60")]
    pub window_secs: u64,

    /// Per-class request ceilings
    #[envconfig(
        from = "RATE_LIMIT_QUOTAS",
        default = "translation=10,auth=5,default=20"
    )]
    pub quotas: QuotaTable,

    /// Connect and operation timeout for the shared store
    #[envconfig(from = "STORE_TIMEOUT_MS", default = "2000")]
    pub store_timeout_ms: u64,

    /// Seconds between store re-probes after a failover; 0 disables
    #[envconfig(from = "STORE_REPROBE_SECS", default = "0")]
    pub store_reprobe_secs: u64,

    /// Local window sweep interval in seconds
    #[envconfig(from = "CLEANUP_INTERVAL", default = "300")]
    pub cleanup_interval_secs: u64,

    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Build the validated limiter settings.
    pub fn limiter_config(&self) -> Result<LimiterConfig, ConfigError> {
        let mut limiter = LimiterConfig::new(
            Duration::from_secs(self.window_secs),
            self.quotas.clone(),
        )
        .with_store_timeout(Duration::from_millis(self.store_timeout_ms));

        if self.store_reprobe_secs > 0 {
            limiter = limiter.with_reprobe_interval(Duration::from_secs(self.store_reprobe_secs));
        }

        limiter.validate()?;
        Ok(limiter)
    }

    /// The shared store URL, if one is configured.
    pub fn redis_url(&self) -> Result<Option<&str>, ConfigError> {
        let url = self.redis_url.trim();
        if url.is_empty() {
            return Ok(None);
        }
        ConfigValidator::validate_redis_url(url)?;
        Ok(Some(url))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

/// Request ceilings keyed by quota class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuotaTable(BTreeMap<String, u32>);

impl QuotaTable {
    pub fn get(&self, quota_class: &str) -> Option<u32> {
        self.0.get(quota_class).copied()
    }

    pub fn insert(&mut self, quota_class: impl Into<String>, max_requests: u32) {
        self.0.insert(quota_class.into(), max_requests);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(class, limit)| (class.as_str(), *limit))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, u32)> for QuotaTable {
    fn from_iter<I: IntoIterator<Item = (S, u32)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Parses `translation=10,auth=5,default=20`.
impl FromStr for QuotaTable {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut table = QuotaTable::default();

        for entry in s.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (class, limit) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidQuotaEntry(entry.to_string()))?;
            let limit: u32 = limit
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidQuotaEntry(entry.to_string()))?;
            table.insert(class.trim(), limit);
        }

        Ok(table)
    }
}

impl fmt::Display for QuotaTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .iter()
            .map(|(class, limit)| format!("{}={}", class, limit))
            .collect();
        write!(f, "{}", entries.join(","))
    }
}

/// Settings for one admission controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(with = "humantime_serde", default = "default_window_size")]
    pub window_size: Duration,
    pub quotas: QuotaTable,
    #[serde(with = "humantime_serde", default = "default_store_timeout")]
    pub store_timeout: Duration,
    /// Retry the shared store this long after a failover. `None` keeps the
    /// controller on the local backend for the rest of the process.
    #[serde(with = "humantime_serde", default)]
    pub reprobe_interval: Option<Duration>,
}

fn default_window_size() -> Duration {
    Duration::from_secs(60)
}

fn default_store_timeout() -> Duration {
    Duration::from_secs(2)
}

impl LimiterConfig {
    pub fn new(window_size: Duration, quotas: impl Into<QuotaTable>) -> Self {
        Self {
            window_size,
            quotas: quotas.into(),
            store_timeout: default_store_timeout(),
            reprobe_interval: None,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_reprobe_interval(mut self, interval: Duration) -> Self {
        self.reprobe_interval = Some(interval);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigValidator::validate_limiter(self)
    }

    /// Lifetime of a store key; abandoned keys expire on their own.
    pub fn key_ttl(&self) -> Duration {
        self.window_size.checked_mul(2).unwrap_or(Duration::MAX)
    }

    /// Window length in milliseconds, saturating at `u64::MAX`.
    pub fn window_ms(&self) -> u64 {
        as_millis(self.window_size)
    }

    /// Retry hint returned with a denial, in whole seconds.
    pub fn retry_after_seconds(&self) -> u64 {
        let secs = self.window_size.as_secs();
        if self.window_size.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }
}

impl<const N: usize> From<[(&str, u32); N]> for QuotaTable {
    fn from(entries: [(&str, u32); N]) -> Self {
        entries.into_iter().collect()
    }
}
