//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PRERENDER_*)
//! 2. TOML config file (if PRERENDER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::BTreeMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::{CacheSettings, DEFAULT_CAPACITY, DEFAULT_TTL_SECS};

mod validation;

pub use validation::ConfigError;

/// Which cache backend the service is built with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// In-process LRU+TTL cache.
    #[default]
    Local,
    /// The prerender-storage service at `remote_cache_url`.
    Remote,
}

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PRERENDER_*)
/// 2. TOML config file (if PRERENDER_CONFIG_FILE set)
/// 3. Built-in defaults
///
/// List values can be given in the environment as `["a", "b"]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Cache backend selected at startup.
    ///
    /// Set via PRERENDER_CACHE_BACKEND (`local` or `remote`).
    #[serde(default)]
    pub cache_backend: CacheBackend,

    /// Base URL of the remote cache service.
    ///
    /// Set via PRERENDER_REMOTE_CACHE_URL environment variable.
    #[serde(default = "default_remote_cache_url")]
    pub remote_cache_url: String,

    /// Maximum number of cached pages.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Page lifetime in seconds, measured from the write.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Listen address of the storage service.
    ///
    /// Set via PRERENDER_STORAGE_ADDR environment variable.
    #[serde(default = "default_storage_addr")]
    pub storage_addr: String,

    /// DevTools discovery endpoint of the remote browser.
    #[serde(default = "default_discovery_url")]
    pub discovery_url: String,

    /// Name of the docker container running the remote browser.
    ///
    /// When unset the renderer never issues restart commands.
    #[serde(default = "default_managed_container")]
    pub managed_container: Option<String>,

    /// Docker executable used for restart commands.
    #[serde(default = "default_docker_command")]
    pub docker_command: String,

    /// Hard deadline of one browsing session in milliseconds.
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,

    /// Delay between navigation and HTML extraction in milliseconds.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// URL patterns the browser refuses to load (analytics, maps, trackers).
    #[serde(default = "default_blocked_domains")]
    pub blocked_domains: Vec<String>,

    /// Extra headers attached to every page request.
    #[serde(default = "default_request_headers")]
    pub request_headers: BTreeMap<String, String>,

    /// Minimum seconds between two restarts of the managed container.
    #[serde(default = "default_restart_cooldown_secs")]
    pub restart_cooldown_secs: u64,

    /// Page URLs rendered by the warming sweep.
    #[serde(default)]
    pub warm_pages: Vec<String>,

    /// Concurrent renders during a warming sweep.
    #[serde(default = "default_warm_concurrency")]
    pub warm_concurrency: usize,

    /// Run one warming sweep when the server boots.
    #[serde(default = "default_true")]
    pub warm_on_start: bool,
}

fn default_remote_cache_url() -> String {
    "http://127.0.0.1:50051".into()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_cache_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

fn default_storage_addr() -> String {
    "127.0.0.1:50051".into()
}

fn default_discovery_url() -> String {
    "http://localhost:9222/json/version".into()
}

fn default_managed_container() -> Option<String> {
    Some("headless-shell".into())
}

fn default_docker_command() -> String {
    "docker".into()
}

fn default_session_timeout_ms() -> u64 {
    60_000
}

fn default_settle_delay_ms() -> u64 {
    200
}

fn default_blocked_domains() -> Vec<String> {
    [
        "google-analytics.com",
        "mc.yandex.ru",
        "maps.googleapis.com",
        "googletagmanager.com",
        "api-maps.yandex.ru",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_request_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("X-Prerender-Next".to_string(), "1".to_string())])
}

fn default_restart_cooldown_secs() -> u64 {
    180
}

fn default_warm_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_backend: CacheBackend::Local,
            remote_cache_url: default_remote_cache_url(),
            cache_capacity: default_cache_capacity(),
            cache_ttl_secs: default_cache_ttl_secs(),
            storage_addr: default_storage_addr(),
            discovery_url: default_discovery_url(),
            managed_container: default_managed_container(),
            docker_command: default_docker_command(),
            session_timeout_ms: default_session_timeout_ms(),
            settle_delay_ms: default_settle_delay_ms(),
            blocked_domains: default_blocked_domains(),
            request_headers: default_request_headers(),
            restart_cooldown_secs: default_restart_cooldown_secs(),
            warm_pages: Vec::new(),
            warm_concurrency: default_warm_concurrency(),
            warm_on_start: true,
        }
    }
}

impl AppConfig {
    /// Session deadline as Duration.
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    /// Settle delay as Duration.
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Restart cooldown as Duration.
    pub fn restart_cooldown(&self) -> Duration {
        Duration::from_secs(self.restart_cooldown_secs)
    }

    /// Capacity and TTL for a local cache backend.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings { capacity: self.cache_capacity, ttl: Duration::from_secs(self.cache_ttl_secs) }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PRERENDER_`
    /// 2. TOML file from `PRERENDER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PRERENDER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PRERENDER_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
