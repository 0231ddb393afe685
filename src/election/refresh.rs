//! Per-key refresh loop.
//!
//! One task per managed key. Every process runs one; the lock decides which
//! of them recomputes the value:
//!
//! ```text
//! follower:  sleep(sleep_ttl) → acquire ─┬─ conflict / error ──► sleep again
//!                                        └─ acquired → produce → put ─┐
//!                                                                     │ fail: release
//!                                                                     ▼
//! leader:    wait(timer_ttl) → produce → put → reload signal → renew ─┘
//!            shutdown while leading: release, exit
//!            produce or put fails:   release, back to follower
//!            renew fails:            back to follower (the lock is not ours)
//! ```
//!
//! Failures are logged and never leave the loop.

use crate::adapters::BoxFuture;
use crate::core::error::CacheResult;
use crate::core::runtime::wait_for_shutdown;
use crate::core::time::RefreshTimings;
use crate::election::lock::{LockManager, LockRecord};
use crate::local::poller::ReloadSignal;
use crate::store::entry::SnapshotEntry;
use crate::store::gateway::SharedCacheGateway;
use crate::store::key::CacheKey;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Computes the value published for a key.
///
/// Called repeatedly with the same parameters; should be idempotent.
pub trait Producer: Send + Sync {
    fn produce<'a>(&'a self, params: &'a [Value]) -> BoxFuture<'a, CacheResult<Map<String, Value>>>;
}

/// Producer backed by a synchronous closure.
pub struct FnProducer<F>(F);

/// Wrap a closure as a [`Producer`].
pub fn producer_fn<F>(f: F) -> FnProducer<F>
where
    F: Fn(&[Value]) -> CacheResult<Map<String, Value>> + Send + Sync,
{
    FnProducer(f)
}

impl<F> Producer for FnProducer<F>
where
    F: Fn(&[Value]) -> CacheResult<Map<String, Value>> + Send + Sync,
{
    fn produce<'a>(&'a self, params: &'a [Value]) -> BoxFuture<'a, CacheResult<Map<String, Value>>> {
        let result = (self.0)(params);
        Box::pin(async move { result })
    }
}

#[derive(Debug, Default)]
struct RefreshState {
    leader: AtomicBool,
    attempts: AtomicU64,
    publishes: AtomicU64,
    failed_publishes: AtomicU64,
    leadership_acquired: AtomicU64,
    leadership_lost: AtomicU64,
}

/// Snapshot of refresh loop counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Whether the loop currently leads.
    pub is_leader: bool,
    /// Election attempts.
    pub attempts: u64,
    /// Values written to the shared store.
    pub publishes: u64,
    /// Produce or put failures.
    pub failed_publishes: u64,
    /// Times leadership was gained.
    pub leadership_acquired: u64,
    /// Times leadership was given up or lost.
    pub leadership_lost: u64,
}

enum LeaderExit {
    Shutdown,
    Lost,
}

/// Leader election and periodic recomputation for one key.
pub struct RefreshLoop {
    key: String,
    holder: String,
    params: Vec<Value>,
    locks: Arc<LockManager>,
    gateway: Arc<SharedCacheGateway>,
    producer: Arc<dyn Producer>,
    reload: Option<ReloadSignal>,
    state: Arc<RefreshState>,
}

impl RefreshLoop {
    /// Create a loop for `key` run as `holder`.
    pub fn new(
        key: impl Into<String>,
        holder: impl Into<String>,
        locks: Arc<LockManager>,
        gateway: Arc<SharedCacheGateway>,
        producer: Arc<dyn Producer>,
    ) -> Self {
        Self {
            key: key.into(),
            holder: holder.into(),
            params: Vec::new(),
            locks,
            gateway,
            producer,
            reload: None,
            state: Arc::new(RefreshState::default()),
        }
    }

    /// Parameters passed to the producer on every call.
    pub fn with_params(mut self, params: Vec<Value>) -> Self {
        self.params = params;
        self
    }

    /// Signal this poller after every publish.
    pub fn with_reload(mut self, reload: ReloadSignal) -> Self {
        self.reload = Some(reload);
        self
    }

    /// Start the loop. It runs until `shutdown_rx` turns `true`.
    pub fn spawn(self, timings: RefreshTimings, shutdown_rx: watch::Receiver<bool>) -> RefreshHandle {
        let (timings_tx, timings_rx) = watch::channel(timings);
        let key = self.key.clone();
        let state = Arc::clone(&self.state);
        let join = tokio::spawn(self.run(timings_rx, shutdown_rx));
        RefreshHandle {
            key,
            join: Some(join),
            state,
            timings_tx,
        }
    }

    async fn run(self, timings_rx: watch::Receiver<RefreshTimings>, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!(key = %self.key, holder = %self.holder, "refresh loop started");

        loop {
            let sleep_ttl = timings_rx.borrow().sleep_ttl;
            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = tokio::time::sleep(sleep_ttl) => {}
            }

            let timings = *timings_rx.borrow();
            let Some(mut record) = self.try_lead(&timings).await else {
                continue;
            };

            match self.lead(&mut record, &timings_rx, &mut shutdown_rx).await {
                LeaderExit::Shutdown => break,
                LeaderExit::Lost => continue,
            }
        }

        tracing::info!(key = %self.key, "refresh loop stopped");
    }

    /// Take the lock and publish once. `None` means stay a follower.
    async fn try_lead(&self, timings: &RefreshTimings) -> Option<LockRecord> {
        self.state.attempts.fetch_add(1, Ordering::Relaxed);
        let record = self
            .locks
            .acquire(&self.key, &self.holder, timings.lock_ttl)
            .await?;

        if !self.publish(timings.cache_ttl).await {
            self.locks.release(&record).await;
            return None;
        }

        self.state.leader.store(true, Ordering::Release);
        self.state.leadership_acquired.fetch_add(1, Ordering::Relaxed);
        tracing::info!(key = %self.key, holder = %self.holder, "leadership acquired");
        Some(record)
    }

    async fn lead(
        &self,
        record: &mut LockRecord,
        timings_rx: &watch::Receiver<RefreshTimings>,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> LeaderExit {
        loop {
            let timer_ttl = timings_rx.borrow().timer_ttl;
            tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown_rx) => {
                    self.locks.release(record).await;
                    self.step_down("shutdown");
                    return LeaderExit::Shutdown;
                }
                _ = tokio::time::sleep(timer_ttl) => {}
            }

            // Re-read so a changed period extends the lock before the next wait.
            let timings = *timings_rx.borrow();
            if !self.publish(timings.cache_ttl).await {
                self.locks.release(record).await;
                self.step_down("publish failed");
                return LeaderExit::Lost;
            }

            if !self.locks.renew(record, timings.lock_ttl).await {
                self.step_down("renewal failed");
                return LeaderExit::Lost;
            }
        }
    }

    /// Produce, write, then signal the poller. `false` on any failure.
    async fn publish(&self, cache_ttl: Duration) -> bool {
        let data = match self.producer.produce(&self.params).await {
            Ok(data) => data,
            Err(e) => {
                self.state.failed_publishes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %self.key, error = %e, "producer failed");
                return false;
            }
        };

        let entry = match SnapshotEntry::from_map(&data) {
            Ok(entry) => entry,
            Err(e) => {
                self.state.failed_publishes.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %self.key, error = %e, "producer output did not encode");
                return false;
            }
        };

        if let Err(e) = self
            .gateway
            .put(&CacheKey::logical(&self.key), &entry, cache_ttl)
            .await
        {
            self.state.failed_publishes.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(key = %self.key, error = %e, "publish failed");
            return false;
        }

        self.state.publishes.fetch_add(1, Ordering::Relaxed);
        if let Some(ref reload) = self.reload {
            reload.send();
        }
        true
    }

    fn step_down(&self, reason: &'static str) {
        self.state.leader.store(false, Ordering::Release);
        self.state.leadership_lost.fetch_add(1, Ordering::Relaxed);
        tracing::info!(key = %self.key, holder = %self.holder, reason, "leadership given up");
    }
}

/// Handle to a running refresh loop.
pub struct RefreshHandle {
    key: String,
    join: Option<JoinHandle<()>>,
    state: Arc<RefreshState>,
    timings_tx: watch::Sender<RefreshTimings>,
}

impl RefreshHandle {
    /// Key this loop manages.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Replace the timings; they apply from the next wait.
    pub fn set_timings(&self, timings: RefreshTimings) {
        self.timings_tx.send_replace(timings);
    }

    /// Current timings.
    pub fn timings(&self) -> RefreshTimings {
        *self.timings_tx.borrow()
    }

    /// Check if this loop currently leads.
    pub fn is_leader(&self) -> bool {
        self.state.leader.load(Ordering::Acquire)
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
                tracing::warn!(key = %self.key, error = %e, "refresh task failed");
                true
            }
            Err(_) => {
                tracing::warn!(key = %self.key, "timed out waiting for refresh loop to stop");
                false
            }
        }
    }

    /// Get counter snapshot.
    pub fn stats(&self) -> RefreshStats {
        RefreshStats {
            is_leader: self.is_leader(),
            attempts: self.state.attempts.load(Ordering::Relaxed),
            publishes: self.state.publishes.load(Ordering::Relaxed),
            failed_publishes: self.state.failed_publishes.load(Ordering::Relaxed),
            leadership_acquired: self.state.leadership_acquired.load(Ordering::Relaxed),
            leadership_lost: self.state.leadership_lost.load(Ordering::Relaxed),
        }
    }
}
