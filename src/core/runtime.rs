//! Coordinator runtime.
//!
//! A [`Coordinator`] owns everything one embedding needs: the lock manager,
//! the shared cache gateway, the local registry, the poller task and one
//! refresh loop per managed key. Several coordinators can live in one
//! process; nothing is global.
//!
//! Lifecycle:
//! - `new` validates configuration and resolves the holder identity; no
//!   tasks are started
//! - the poller starts on first use (`start_poller`, `manage`,
//!   `register_local`)
//! - `shutdown` flips the shared watch channel: leading loops release their
//!   locks, the poller exits, and every task is awaited with a bounded
//!   timeout

use crate::adapters::{CoordinationBackend, SharedStore};
use crate::core::config::Config;
use crate::core::error::{CacheError, CacheResult};
use crate::core::time::{RefreshTimings, TtlFactors};
use crate::election::lock::LockManager;
use crate::election::refresh::{Producer, RefreshLoop, RefreshStats, RefreshHandle};
use crate::local::body::CacheBody;
use crate::local::poller::{LocalCachePoller, PollerStats};
use crate::local::registry::LocalCacheRegistry;
use crate::store::gateway::{GatewayConfig, SharedCacheGateway};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// How long `shutdown` waits for each task.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolve once `rx` holds `true` or its sender is gone.
pub async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

/// Explicit owner of the lock manager, gateway, registry and background
/// tasks for one fleet membership.
pub struct Coordinator {
    /// Validated configuration.
    config: Arc<Config>,

    /// `host:port` written into lock nodes.
    holder: String,

    factors: TtlFactors,

    locks: Arc<LockManager>,

    gateway: Arc<SharedCacheGateway>,

    registry: Arc<LocalCacheRegistry>,

    /// Started on first use.
    poller: Mutex<Option<LocalCachePoller>>,

    /// Running refresh loops by key.
    loops: Mutex<HashMap<String, RefreshHandle>>,

    running: AtomicBool,

    shutdown_tx: watch::Sender<bool>,

    shutdown_rx: watch::Receiver<bool>,
}

impl Coordinator {
    /// Create a coordinator over the given backends.
    ///
    /// Fails with a configuration error when the configuration is invalid
    /// or the holder identity cannot be resolved.
    pub fn new(
        config: Config,
        coordination: Arc<dyn CoordinationBackend>,
        store: Arc<dyn SharedStore>,
    ) -> CacheResult<Self> {
        config.validate()?;
        let holder = config.coordination.holder_identity()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let locks = Arc::new(LockManager::from_config(coordination, &config.coordination));
        let gateway = Arc::new(SharedCacheGateway::new(
            GatewayConfig::from(&config.shared_store),
            store,
        ));

        tracing::info!(
            holder = %holder,
            namespace = %config.shared_store.namespace,
            timer_ttl_secs = config.refresh.timer_ttl_seconds,
            "coordinator created"
        );

        Ok(Self {
            factors: TtlFactors::from(&config.refresh),
            config: Arc::new(config),
            holder,
            locks,
            gateway,
            registry: Arc::new(LocalCacheRegistry::new()),
            poller: Mutex::new(None),
            loops: Mutex::new(HashMap::new()),
            running: AtomicBool::new(true),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Create a coordinator using the etcd v2 adapter for coordination.
    #[cfg(feature = "etcd-http")]
    pub fn with_etcd(config: Config, store: Arc<dyn SharedStore>) -> CacheResult<Self> {
        let coordination = crate::adapters::etcd::EtcdHttpCoordination::from_config(&config.coordination)?;
        Self::new(config, Arc::new(coordination), store)
    }

    /// Get the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Holder identity of this process.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.locks
    }

    pub fn gateway(&self) -> &Arc<SharedCacheGateway> {
        &self.gateway
    }

    pub fn registry(&self) -> &Arc<LocalCacheRegistry> {
        &self.registry
    }

    /// Check if `shutdown` has not been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Get a shutdown receiver for tasks started by the embedder.
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Timings this process would use for a base period.
    pub fn timings_for(&self, timer_ttl: Duration) -> RefreshTimings {
        RefreshTimings::derive(timer_ttl, &self.holder, self.factors)
    }

    /// Timings for the configured base period.
    pub fn default_timings(&self) -> RefreshTimings {
        self.timings_for(self.config.refresh.timer_ttl())
    }

    /// Start the poller if it is not running yet.
    pub fn start_poller(&self) -> CacheResult<()> {
        self.ensure_running()?;
        let mut poller = self.poller.lock();
        if poller.is_none() {
            *poller = Some(LocalCachePoller::spawn(
                Arc::clone(&self.registry),
                Arc::clone(&self.gateway),
                &self.config.poller,
                self.shutdown_rx.clone(),
            ));
        }
        Ok(())
    }

    /// Start a refresh loop for `key` with the configured base period.
    ///
    /// Returns `false` if `key` is already managed by this coordinator.
    pub fn manage(
        &self,
        key: &str,
        producer: Arc<dyn Producer>,
        params: Vec<Value>,
    ) -> CacheResult<bool> {
        self.manage_with_timings(key, producer, params, self.default_timings())
    }

    /// Start a refresh loop for `key` with explicit timings.
    pub fn manage_with_timings(
        &self,
        key: &str,
        producer: Arc<dyn Producer>,
        params: Vec<Value>,
        timings: RefreshTimings,
    ) -> CacheResult<bool> {
        self.start_poller()?;

        let mut loops = self.loops.lock();
        if loops.contains_key(key) {
            tracing::debug!(key = %key, "key already managed");
            return Ok(false);
        }

        let mut refresh = RefreshLoop::new(
            key,
            self.holder.clone(),
            Arc::clone(&self.locks),
            Arc::clone(&self.gateway),
            producer,
        )
        .with_params(params);
        if let Some(ref poller) = *self.poller.lock() {
            refresh = refresh.with_reload(poller.reload_signal());
        }

        let handle = refresh.spawn(timings, self.shutdown_rx.clone());
        loops.insert(key.to_string(), handle);
        Ok(true)
    }

    /// Change the base period of a managed key; applies from its next wait.
    ///
    /// Returns `false` if `key` is not managed.
    pub fn set_timer_ttl(&self, key: &str, timer_ttl: Duration) -> bool {
        let timings = self.timings_for(timer_ttl);
        match self.loops.lock().get(key) {
            Some(handle) => {
                handle.set_timings(timings);
                true
            }
            None => false,
        }
    }

    /// Check if this process currently leads `key`.
    pub fn is_leader(&self, key: &str) -> bool {
        self.loops
            .lock()
            .get(key)
            .map(|h| h.is_leader())
            .unwrap_or(false)
    }

    /// Counters of the refresh loop for `key`.
    pub fn refresh_stats(&self, key: &str) -> Option<RefreshStats> {
        self.loops.lock().get(key).map(|h| h.stats())
    }

    /// Register a local mirror for `key` and start the poller.
    ///
    /// Returns `false` if `key` already has a mirror; the existing one is
    /// kept.
    pub fn register_local(&self, key: &str, body: Arc<dyn CacheBody>) -> CacheResult<bool> {
        self.start_poller()?;
        Ok(self.registry.register(key, body))
    }

    /// Register a whole-snapshot mirror for `key` and start the poller.
    pub fn register_default(&self, key: &str) -> CacheResult<bool> {
        self.start_poller()?;
        Ok(self.registry.register_default(key))
    }

    /// Read from the local mirror of `key`. Never touches the network.
    pub fn get(&self, key: &str, params: &[Value]) -> Option<Value> {
        self.registry.get(key, params)
    }

    /// Ask the poller for an immediate reload.
    ///
    /// Returns `false` if the poller is not running or the signal was
    /// dropped.
    pub fn reload(&self) -> bool {
        self.poller
            .lock()
            .as_ref()
            .map(|p| p.reload())
            .unwrap_or(false)
    }

    /// Change the poll interval without restarting the poller.
    ///
    /// Returns `false` when the poller has not started or `interval` is zero.
    pub fn set_poll_interval(&self, interval: Duration) -> bool {
        match self.poller.lock().as_ref() {
            Some(poller) => poller.set_interval(interval),
            None => false,
        }
    }

    /// Poller counters, once the poller has started.
    pub fn poller_stats(&self) -> Option<PollerStats> {
        self.poller.lock().as_ref().map(|p| p.stats())
    }

    /// Stop every task.
    ///
    /// Leading loops release their locks before exiting. Each task gets up
    /// to [`STOP_TIMEOUT`] to finish. Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        tracing::info!(holder = %self.holder, "coordinator shutting down");
        self.shutdown_tx.send_replace(true);

        let loops: Vec<RefreshHandle> = self.loops.lock().drain().map(|(_, h)| h).collect();
        for mut handle in loops {
            handle.join(STOP_TIMEOUT).await;
        }

        let poller = self.poller.lock().take();
        if let Some(mut poller) = poller {
            poller.join(STOP_TIMEOUT).await;
        }

        tracing::info!(holder = %self.holder, "coordinator stopped");
    }

    fn ensure_running(&self) -> CacheResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(CacheError::Stopped)
        }
    }
}
