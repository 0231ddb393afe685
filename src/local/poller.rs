//! Local cache poller.
//!
//! One background task per coordinator. It reloads every registered mirror
//! from the shared store on each tick, and immediately when a reload
//! signal arrives:
//!
//! ```text
//!            ┌──────── stop / shutdown ──────► exit (queued signals dropped)
//!            │
//!   wait ────┼──────── interval changed ─────► wait until last load + new interval
//!            │
//!            ├──────── reload signal ───────┐
//!            │                              ├─► load every registered key
//!            └──────── tick elapsed ────────┘
//! ```
//!
//! The tick deadline is measured from the end of the last load pass, so
//! changing the interval never postpones a load past `last load + interval`.
//! A key missing from the shared store keeps its stale local value.

use crate::core::config::PollerConfig;
use crate::core::runtime::wait_for_shutdown;
use crate::local::registry::LocalCacheRegistry;
use crate::store::entry::SnapshotEntry;
use crate::store::gateway::SharedCacheGateway;
use crate::store::key::CacheKey;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Default)]
struct PollerMetrics {
    cycles: AtomicU64,
    reloads: AtomicU64,
    loads: AtomicU64,
    misses: AtomicU64,
    renew_failures: AtomicU64,
    dropped_signals: AtomicU64,
}

/// Snapshot of poller counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Completed load passes, from ticks and signals.
    pub cycles: u64,
    /// Load passes started by a reload signal.
    pub reloads: u64,
    /// Mirrors refreshed with fresh bytes.
    pub loads: u64,
    /// Keys not found in the shared store.
    pub misses: u64,
    /// Bodies that rejected fresh bytes.
    pub renew_failures: u64,
    /// Reload signals dropped on a full queue.
    pub dropped_signals: u64,
}

/// Non-blocking reload trigger for the poller.
#[derive(Debug, Clone)]
pub struct ReloadSignal {
    tx: mpsc::Sender<()>,
    metrics: Arc<PollerMetrics>,
}

impl ReloadSignal {
    /// Ask the poller to reload now.
    ///
    /// Never blocks. Returns `false` if the signal was dropped because the
    /// queue is full or the poller has stopped; the next tick still
    /// converges.
    pub fn send(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                self.metrics.dropped_signals.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("reload queue full, signal dropped");
                false
            }
            Err(TrySendError::Closed(())) => false,
        }
    }
}

/// Loads registered mirrors through the gateway.
struct PollWorker {
    registry: Arc<LocalCacheRegistry>,
    gateway: Arc<SharedCacheGateway>,
    metrics: Arc<PollerMetrics>,
}

impl PollWorker {
    async fn load_all(&self) {
        for key in self.registry.keys() {
            let mut entry = SnapshotEntry::empty();
            if !self.gateway.get(&CacheKey::logical(&key), &mut entry).await {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, "not found in shared store, keeping local copy");
                continue;
            }

            match self.registry.renew(&key, entry.body()) {
                Ok(()) => {
                    self.metrics.loads.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.metrics.renew_failures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "local cache rejected snapshot");
                }
            }
        }
        self.metrics.cycles.fetch_add(1, Ordering::Relaxed);
    }
}

/// Handle to the running poller task.
pub struct LocalCachePoller {
    interval_tx: watch::Sender<Duration>,
    stop_tx: watch::Sender<bool>,
    reload: ReloadSignal,
    metrics: Arc<PollerMetrics>,
    join: Option<JoinHandle<()>>,
}

impl LocalCachePoller {
    /// Start the poller task.
    ///
    /// The task exits on [`stop`](Self::stop) or when `shutdown_rx` turns
    /// `true`.
    pub fn spawn(
        registry: Arc<LocalCacheRegistry>,
        gateway: Arc<SharedCacheGateway>,
        config: &PollerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        let metrics = Arc::new(PollerMetrics::default());
        let (interval_tx, interval_rx) = watch::channel(config.interval());
        let (stop_tx, stop_rx) = watch::channel(false);
        let (reload_tx, reload_rx) = mpsc::channel(config.reload_queue.max(1));

        let worker = PollWorker {
            registry,
            gateway,
            metrics: Arc::clone(&metrics),
        };
        let join = tokio::spawn(run(worker, interval_rx, reload_rx, stop_rx, shutdown_rx));

        Self {
            interval_tx,
            stop_tx,
            reload: ReloadSignal {
                tx: reload_tx,
                metrics: Arc::clone(&metrics),
            },
            metrics,
            join: Some(join),
        }
    }

    /// Get a cloneable reload trigger.
    pub fn reload_signal(&self) -> ReloadSignal {
        self.reload.clone()
    }

    /// Ask for an immediate reload. Never blocks.
    pub fn reload(&self) -> bool {
        self.reload.send()
    }

    /// Change the tick interval; applies from the next wait.
    ///
    /// A zero interval is rejected and leaves the current one in place.
    pub fn set_interval(&self, interval: Duration) -> bool {
        if interval.is_zero() {
            tracing::warn!("ignoring zero poll interval");
            return false;
        }
        // send_replace never fails, even once the task has exited.
        self.interval_tx.send_replace(interval);
        true
    }

    /// Current tick interval.
    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Stop the task. Queued reload signals are discarded.
    pub fn stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Check if the task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map(|j| j.is_finished()).unwrap_or(true)
    }

    /// Wait for the task to exit, up to `timeout`.
    ///
    /// Returns `false` if the task did not exit in time.
    pub async fn join(&mut self, timeout: Duration) -> bool {
        let Some(join) = self.join.take() else {
            return true;
        };
        match tokio::time::timeout(timeout, join).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "poller task failed");
                true
            }
            Err(_) => {
                tracing::warn!("timed out waiting for poller to stop");
                false
            }
        }
    }

    /// Get counter snapshot.
    pub fn stats(&self) -> PollerStats {
        PollerStats {
            cycles: self.metrics.cycles.load(Ordering::Relaxed),
            reloads: self.metrics.reloads.load(Ordering::Relaxed),
            loads: self.metrics.loads.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            renew_failures: self.metrics.renew_failures.load(Ordering::Relaxed),
            dropped_signals: self.metrics.dropped_signals.load(Ordering::Relaxed),
        }
    }
}

async fn run(
    worker: PollWorker,
    mut interval_rx: watch::Receiver<Duration>,
    mut reload_rx: mpsc::Receiver<()>,
    mut stop_rx: watch::Receiver<bool>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tracing::info!(interval_ms = interval_rx.borrow().as_millis() as u64, "local cache poller started");

    let mut last_load = Instant::now();
    loop {
        let next_tick = last_load + *interval_rx.borrow_and_update();

        tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut stop_rx) => break,
            _ = wait_for_shutdown(&mut shutdown_rx) => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::debug!(interval_ms = interval_rx.borrow().as_millis() as u64, "poll interval changed");
                continue;
            }
            signal = reload_rx.recv() => {
                if signal.is_none() {
                    break;
                }
                // Collapse a burst of signals into one pass.
                while reload_rx.try_recv().is_ok() {}
                worker.metrics.reloads.fetch_add(1, Ordering::Relaxed);
            }
            _ = tokio::time::sleep_until(next_tick) => {}
        }

        worker.load_all().await;
        last_load = Instant::now();
    }

    tracing::info!("local cache poller stopped");
}
