//! Common test utilities.
//!
//! Shared helpers for integration tests. Import with `mod common;` in test
//! files.

#![allow(dead_code)]

use fleetcache::adapters::memory::{MemoryCoordination, MemoryStore};
use fleetcache::core::config::Config;
use fleetcache::core::error::CacheError;
use fleetcache::core::time::RefreshTimings;
use fleetcache::election::lock::LockManager;
use fleetcache::election::refresh::{producer_fn, Producer};
use fleetcache::store::gateway::{GatewayConfig, SharedCacheGateway};
use fleetcache::Coordinator;
use serde_json::{json, Map, Value};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const NAMESPACE: &str = "test_ns";
pub const PREFIX: &str = "test_prefix";
pub const LOCK_PREFIX: &str = "/fleetcache/locks/";

/// Base refresh period used by loop tests.
pub const TIMER_TTL: Duration = Duration::from_secs(10);

/// Configuration text for a process with the given host and port.
pub fn config_toml(host: &str, port: u16) -> String {
    format!(
        r#"
[shared_store]
namespace = "{}"
prefix = "{}"

[coordination]
endpoints = ["http://127.0.0.1:4001"]
port = {}
host = "{}"

[refresh]
timer_ttl_seconds = 10

[poller]
interval_ms = 2000
"#,
        NAMESPACE, PREFIX, port, host
    )
}

/// Write a configuration file for a process with the given host.
pub fn create_config_file(host: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(config_toml(host, 4001).as_bytes())
        .expect("Failed to write config");
    file
}

/// Parsed configuration for a process with the given host.
pub fn test_config(host: &str) -> Config {
    Config::from_toml(&config_toml(host, 4001)).expect("test config must be valid")
}

/// In-memory backends shared by every simulated process.
#[derive(Clone, Default)]
pub struct Backends {
    pub coordination: Arc<MemoryCoordination>,
    pub store: Arc<MemoryStore>,
}

impl Backends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway over the shared store with test namespace and prefix.
    pub fn gateway(&self) -> Arc<SharedCacheGateway> {
        Arc::new(SharedCacheGateway::new(
            GatewayConfig::new(NAMESPACE, PREFIX),
            self.store.clone(),
        ))
    }

    /// Lock manager over the coordination service.
    pub fn locks(&self) -> Arc<LockManager> {
        Arc::new(LockManager::new(self.coordination.clone(), LOCK_PREFIX))
    }

    /// Coordinator for a process with the given host.
    pub fn coordinator(&self, host: &str) -> Coordinator {
        Coordinator::new(
            test_config(host),
            self.coordination.clone(),
            self.store.clone(),
        )
        .expect("coordinator must build")
    }
}

/// Lock path of a key under the test lock prefix.
pub fn lock_path(key: &str) -> String {
    format!("{}{}", LOCK_PREFIX, key)
}

/// Timings for loop tests: 10 s period, sleep between 4 s and 6 s.
pub fn test_timings(holder: &str) -> RefreshTimings {
    RefreshTimings::with_defaults(TIMER_TTL, holder)
}

/// Producer returning `{"count": n}` where `n` counts calls.
pub fn counting_producer(calls: Arc<AtomicU64>) -> Arc<dyn Producer> {
    Arc::new(producer_fn(move |_params: &[Value]| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(object(json!({ "count": n })))
    }))
}

/// Producer that always fails.
pub fn failing_producer() -> Arc<dyn Producer> {
    Arc::new(producer_fn(|_params: &[Value]| {
        Err(CacheError::data_format("upstream returned garbage"))
    }))
}

/// Producer echoing its parameters as `{"params": [...]}`.
pub fn echo_producer() -> Arc<dyn Producer> {
    Arc::new(producer_fn(|params: &[Value]| {
        Ok(object(json!({ "params": params })))
    }))
}

/// Unwrap a JSON object literal.
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {}", other),
    }
}

/// Advance paused time in one-second steps, checking `check` after each.
pub async fn step_seconds<F>(seconds: u64, mut check: F)
where
    F: FnMut(u64),
{
    for second in 1..=seconds {
        tokio::time::sleep(Duration::from_secs(1)).await;
        check(second);
    }
}
