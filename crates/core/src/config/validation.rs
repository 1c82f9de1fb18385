//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, CacheBackend};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_capacity` or `cache_ttl_secs` is 0
    /// - `session_timeout_ms` is below 1s or exceeds 5 minutes
    /// - `settle_delay_ms` exceeds 10s
    /// - `warm_concurrency` is 0
    /// - `remote_cache_url` does not parse while the remote backend is selected
    ///
    /// Returns `ConfigError::Missing` if `docker_command` is empty while a
    /// managed container is configured.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(ConfigError::Invalid { field: "cache_capacity".into(), reason: "must be greater than 0".into() });
        }

        if self.cache_ttl_secs == 0 {
            return Err(ConfigError::Invalid { field: "cache_ttl_secs".into(), reason: "must be greater than 0".into() });
        }

        if self.session_timeout_ms < 1_000 {
            return Err(ConfigError::Invalid {
                field: "session_timeout_ms".into(),
                reason: "must be at least 1000ms".into(),
            });
        }
        if self.session_timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "session_timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.settle_delay_ms > 10_000 {
            return Err(ConfigError::Invalid {
                field: "settle_delay_ms".into(),
                reason: "must not exceed 10000ms".into(),
            });
        }

        if self.warm_concurrency == 0 {
            return Err(ConfigError::Invalid { field: "warm_concurrency".into(), reason: "must be greater than 0".into() });
        }

        if self.cache_backend == CacheBackend::Remote
            && let Err(e) = url::Url::parse(&self.remote_cache_url)
        {
            return Err(ConfigError::Invalid { field: "remote_cache_url".into(), reason: e.to_string() });
        }

        if self.managed_container.is_some() && self.docker_command.is_empty() {
            return Err(ConfigError::Missing {
                field: "docker_command".into(),
                hint: "Set PRERENDER_DOCKER_COMMAND or unset managed_container".into(),
            });
        }

        if self.session_timeout_ms <= self.settle_delay_ms {
            tracing::warn!(
                session_timeout_ms = self.session_timeout_ms,
                settle_delay_ms = self.settle_delay_ms,
                "settle delay consumes the whole session deadline; every render will time out"
            );
        }

        Ok(())
    }
}
