//! Configuration parsing and validation.
//!
//! fleetcache configuration is loaded from TOML files with CLI overrides.
//! Sections mirror the components: the shared store, the coordination
//! service, the refresh loops, the local cache poller and telemetry.

use crate::core::error::{CacheError, CacheResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level fleetcache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shared TTL store settings.
    pub shared_store: SharedStoreConfig,

    /// Coordination service settings.
    pub coordination: CoordinationConfig,

    /// Refresh loop timing.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Local cache poller settings.
    #[serde(default)]
    pub poller: PollerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Shared TTL store configuration.
///
/// Connection settings for the store itself belong to the [`SharedStore`]
/// backend the embedder supplies; these settings shape the requests the
/// gateway makes through it.
///
/// [`SharedStore`]: crate::adapters::SharedStore
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedStoreConfig {
    /// Store namespace every entry lives in.
    pub namespace: String,

    /// Prefix prepended to every primary key.
    #[serde(default)]
    pub prefix: String,

    /// Per-request timeout in milliseconds; an elapsed request is a transport error.
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,

    /// Transport-level retries for a single get or put.
    #[serde(default = "default_store_max_retries")]
    pub max_retries: u32,

    /// Pause between retries in milliseconds.
    #[serde(default = "default_store_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

impl SharedStoreConfig {
    /// Get the request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the pause between retries.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Coordination service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Coordination service base URLs.
    pub endpoints: Vec<String>,

    /// Port advertised by this process, part of the holder identity.
    pub port: u16,

    /// Hostname override for the holder identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Path prefix for lock keys.
    #[serde(default = "default_lock_prefix")]
    pub lock_prefix: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl CoordinationConfig {
    /// Get the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Build the holder identity (`host:port`) for this process.
    ///
    /// Falls back to the OS hostname when no override is configured.
    pub fn holder_identity(&self) -> CacheResult<String> {
        let host = match self.host {
            Some(ref host) if !host.trim().is_empty() => host.trim().to_string(),
            _ => system_hostname().ok_or_else(|| {
                CacheError::configuration(
                    "could not determine hostname; set coordination.host explicitly",
                )
            })?,
        };
        Ok(format!("{}:{}", host, self.port))
    }
}

fn system_hostname() -> Option<String> {
    if let Ok(host) = std::env::var("HOSTNAME") {
        if !host.trim().is_empty() {
            return Some(host.trim().to_string());
        }
    }
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Refresh loop timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Base refresh period in seconds.
    #[serde(default = "default_timer_ttl_seconds")]
    pub timer_ttl_seconds: u64,

    /// Lock TTL as a multiple of the refresh period.
    #[serde(default = "default_lock_ttl_factor")]
    pub lock_ttl_factor: f64,

    /// Shared-store entry TTL as a multiple of the refresh period.
    #[serde(default = "default_cache_ttl_factor")]
    pub cache_ttl_factor: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            timer_ttl_seconds: default_timer_ttl_seconds(),
            lock_ttl_factor: default_lock_ttl_factor(),
            cache_ttl_factor: default_cache_ttl_factor(),
        }
    }
}

impl RefreshConfig {
    /// Get the base refresh period.
    pub fn timer_ttl(&self) -> Duration {
        Duration::from_secs(self.timer_ttl_seconds)
    }
}

/// Local cache poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Tick interval in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,

    /// Capacity of the reload signal queue.
    #[serde(default = "default_reload_queue")]
    pub reload_queue: usize,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            reload_queue: default_reload_queue(),
        }
    }
}

impl PollerConfig {
    /// Get the tick interval.
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_store_timeout_ms() -> u64 {
    50
}

fn default_store_max_retries() -> u32 {
    2
}

fn default_store_retry_backoff_ms() -> u64 {
    10
}

fn default_lock_prefix() -> String {
    "/fleetcache/locks/".to_string()
}

fn default_request_timeout_ms() -> u64 {
    1_000
}

// 17 min 17 sec
fn default_timer_ttl_seconds() -> u64 {
    17 * 61
}

fn default_lock_ttl_factor() -> f64 {
    1.5
}

fn default_cache_ttl_factor() -> u32 {
    10
}

// 10.05 min
fn default_poll_interval_ms() -> u64 {
    603_000
}

fn default_reload_queue() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Smallest accepted cache TTL factor; entries must outlive several missed cycles.
pub const MIN_CACHE_TTL_FACTOR: u32 = 5;

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load a file, apply overrides, and validate the result.
    pub fn from_file_with_overrides(path: &Path, overrides: &ConfigOverrides) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(overrides);
        config
            .validate()
            .with_context(|| format!("invalid overrides for {}", path.display()))?;
        Ok(config)
    }

    /// Apply CLI overrides to the configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref log_level) = overrides.log_level {
            self.telemetry.log_level = log_level.clone();
        }
        if let Some(timer_ttl_seconds) = overrides.timer_ttl_seconds {
            self.refresh.timer_ttl_seconds = timer_ttl_seconds;
        }
        if let Some(ref host) = overrides.host {
            self.coordination.host = Some(host.clone());
        }
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> CacheResult<()> {
        self.validate_shared_store()?;
        self.validate_coordination()?;
        self.validate_refresh()?;
        self.validate_poller()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_shared_store(&self) -> CacheResult<()> {
        let store = &self.shared_store;
        if store.namespace.trim().is_empty() {
            return Err(CacheError::configuration(
                "shared_store.namespace must not be empty",
            ));
        }
        if store.timeout_ms == 0 {
            return Err(CacheError::configuration(
                "shared_store.timeout_ms must be > 0",
            ));
        }
        Ok(())
    }

    fn validate_coordination(&self) -> CacheResult<()> {
        let coord = &self.coordination;
        if coord.endpoints.is_empty() {
            return Err(CacheError::configuration(
                "coordination.endpoints must list at least one URL",
            ));
        }
        for endpoint in &coord.endpoints {
            if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
                return Err(CacheError::configuration(format!(
                    "coordination.endpoints entry {:?} must be an http(s) URL",
                    endpoint
                )));
            }
        }
        if coord.port == 0 {
            return Err(CacheError::configuration("coordination.port must be > 0"));
        }
        if coord.request_timeout_ms == 0 {
            return Err(CacheError::configuration(
                "coordination.request_timeout_ms must be > 0",
            ));
        }
        Ok(())
    }

    fn validate_refresh(&self) -> CacheResult<()> {
        let refresh = &self.refresh;
        if refresh.timer_ttl_seconds == 0 {
            return Err(CacheError::configuration(
                "refresh.timer_ttl_seconds must be > 0",
            ));
        }
        if !(refresh.lock_ttl_factor > 1.0) || !refresh.lock_ttl_factor.is_finite() {
            return Err(CacheError::configuration(format!(
                "refresh.lock_ttl_factor must be a finite number > 1.0, got: {}",
                refresh.lock_ttl_factor
            )));
        }
        if refresh.cache_ttl_factor < MIN_CACHE_TTL_FACTOR {
            return Err(CacheError::configuration(format!(
                "refresh.cache_ttl_factor must be >= {}, got: {}",
                MIN_CACHE_TTL_FACTOR, refresh.cache_ttl_factor
            )));
        }
        Ok(())
    }

    fn validate_poller(&self) -> CacheResult<()> {
        if self.poller.interval_ms == 0 {
            return Err(CacheError::configuration("poller.interval_ms must be > 0"));
        }
        if self.poller.reload_queue == 0 {
            return Err(CacheError::configuration("poller.reload_queue must be > 0"));
        }
        Ok(())
    }

    fn validate_telemetry(&self) -> CacheResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            return Err(CacheError::configuration(format!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels, self.telemetry.log_level
            )));
        }
        Ok(())
    }
}

/// CLI override options that can be applied to configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override log level.
    pub log_level: Option<String>,
    /// Override the base refresh period.
    pub timer_ttl_seconds: Option<u64>,
    /// Override the hostname part of the holder identity.
    pub host: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holder_identity_uses_host_override() {
        let coord = CoordinationConfig {
            endpoints: vec!["http://127.0.0.1:4001".to_string()],
            port: 4001,
            host: Some("node-a".to_string()),
            lock_prefix: default_lock_prefix(),
            request_timeout_ms: default_request_timeout_ms(),
        };
        assert_eq!(coord.holder_identity().unwrap(), "node-a:4001");
    }
}
