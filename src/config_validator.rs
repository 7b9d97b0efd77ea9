use crate::config::{LimiterConfig, DEFAULT_QUOTA_CLASS, MAX_WINDOW_SIZE, MIN_WINDOW_SIZE};
use crate::error::ConfigError;
use regex::Regex;
use std::sync::LazyLock;

/// Allowed shape of a quota class name, both in configuration and in URLs.
pub static QUOTA_CLASS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("valid quota class pattern"));

/// Validates configuration objects for consistency and correctness
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a Redis URL
    pub fn validate_redis_url(url: &str) -> Result<(), ConfigError> {
        if url.is_empty() {
            return Err(ConfigError::InvalidRedisUrl("url cannot be empty".to_string()));
        }

        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(ConfigError::InvalidRedisUrl(
                "url must start with 'redis://' or 'rediss://'".to_string(),
            ));
        }

        Ok(())
    }

    pub fn validate_quota_class(name: &str) -> Result<(), ConfigError> {
        if !QUOTA_CLASS_PATTERN.is_match(name) {
            return Err(ConfigError::InvalidQuotaClass(name.to_string()));
        }
        Ok(())
    }

    /// Validates window, timeouts and the quota table.
    pub fn validate_limiter(config: &LimiterConfig) -> Result<(), ConfigError> {
        if config.window_size.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }

        if config.window_size < MIN_WINDOW_SIZE || config.window_size > MAX_WINDOW_SIZE {
            return Err(ConfigError::WindowOutOfRange(config.window_size));
        }

        if config.store_timeout.is_zero() {
            return Err(ConfigError::ZeroStoreTimeout);
        }

        if config.quotas.get(DEFAULT_QUOTA_CLASS).is_none() {
            return Err(ConfigError::MissingDefaultQuota);
        }

        for (class, limit) in config.quotas.iter() {
            Self::validate_quota_class(class)?;
            if limit == 0 {
                return Err(ConfigError::ZeroLimit(class.to_string()));
            }
        }

        Ok(())
    }
}
