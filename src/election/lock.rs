//! Leadership locks on the coordination service.
//!
//! A lock is a node at `lock_prefix + key` holding the holder identity. It
//! is taken with create-if-absent and extended with a compare-and-swap on
//! the value and revision observed at the last successful write, so only
//! the process that created it can keep it alive. Release is a
//! compare-and-delete; if it fails the node still expires with its TTL.

use crate::adapters::{CoordinationBackend, SwapCondition};
use crate::core::config::CoordinationConfig;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A lock held by this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRecord {
    /// Logical key the lock guards.
    pub key: String,
    /// Holder identity stored in the node.
    pub holder: String,
    /// TTL used for the last write.
    pub ttl: Duration,
    /// Revision observed at the last successful write.
    pub revision: u64,
}

#[derive(Debug, Default)]
struct LockMetrics {
    attempts: AtomicU64,
    acquired: AtomicU64,
    conflicts: AtomicU64,
    transport_errors: AtomicU64,
    renewals: AtomicU64,
    renew_failures: AtomicU64,
    releases: AtomicU64,
}

/// Snapshot of lock manager counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStats {
    pub attempts: u64,
    pub acquired: u64,
    pub conflicts: u64,
    pub transport_errors: u64,
    pub renewals: u64,
    pub renew_failures: u64,
    pub releases: u64,
}

/// Acquire, renew and release leadership locks.
pub struct LockManager {
    backend: Arc<dyn CoordinationBackend>,
    prefix: String,
    metrics: LockMetrics,
}

impl LockManager {
    /// Create a lock manager placing lock nodes under `prefix`.
    pub fn new(backend: Arc<dyn CoordinationBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            metrics: LockMetrics::default(),
        }
    }

    /// Create a lock manager using the configured lock prefix.
    pub fn from_config(backend: Arc<dyn CoordinationBackend>, config: &CoordinationConfig) -> Self {
        Self::new(backend, config.lock_prefix.clone())
    }

    /// Coordination path of the lock for `key`.
    pub fn path(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Try to take the lock for `key`.
    ///
    /// Returns `None` when a peer holds it or the service is unreachable;
    /// either way the caller skips this cycle.
    pub async fn acquire(&self, key: &str, holder: &str, ttl: Duration) -> Option<LockRecord> {
        self.metrics.attempts.fetch_add(1, Ordering::Relaxed);
        let path = self.path(key);

        let result = self
            .backend
            .create_if_absent(&path, holder, ttl)
            .await
            .and_then(|outcome| outcome.into_revision(&path));

        match result {
            Ok(revision) => {
                self.metrics.acquired.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path, holder = %holder, revision, "lock acquired");
                Some(LockRecord {
                    key: key.to_string(),
                    holder: holder.to_string(),
                    ttl,
                    revision,
                })
            }
            Err(e) if e.is_conflict() || e.is_not_found() => {
                self.metrics.conflicts.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(path = %path, holder = %holder, error = %e, "lock held by a peer");
                None
            }
            Err(e) => {
                self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %path, error = %e, "lock acquire failed");
                None
            }
        }
    }

    /// Extend a held lock with a fresh TTL.
    ///
    /// Presents the value and revision of the last successful write. Returns
    /// `false` when the lock expired, was taken over or changed, or the
    /// service is unreachable; the caller must stop acting as leader.
    pub async fn renew(&self, record: &mut LockRecord, ttl: Duration) -> bool {
        let path = self.path(&record.key);
        let condition = SwapCondition::value_and_revision(record.holder.clone(), record.revision);

        let result = self
            .backend
            .compare_and_swap(&path, &condition, &record.holder, ttl)
            .await
            .and_then(|outcome| outcome.into_revision(&path));

        match result {
            Ok(revision) => {
                self.metrics.renewals.fetch_add(1, Ordering::Relaxed);
                record.revision = revision;
                record.ttl = ttl;
                true
            }
            Err(e) if e.is_conflict() || e.is_not_found() => {
                self.metrics.renew_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %path, holder = %record.holder, error = %e, "lock renewal rejected");
                false
            }
            Err(e) => {
                self.metrics.renew_failures.fetch_add(1, Ordering::Relaxed);
                self.metrics.transport_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(path = %path, error = %e, "lock renewal failed");
                false
            }
        }
    }

    /// Give up a held lock. Best effort.
    pub async fn release(&self, record: &LockRecord) {
        self.metrics.releases.fetch_add(1, Ordering::Relaxed);
        let path = self.path(&record.key);

        let result = self
            .backend
            .compare_and_delete(&path, &record.holder)
            .await
            .and_then(|outcome| outcome.into_revision(&path));

        match result {
            Ok(_) => {
                tracing::debug!(path = %path, holder = %record.holder, "lock released");
            }
            Err(e) if e.is_conflict() || e.is_not_found() => {
                tracing::debug!(path = %path, error = %e, "lock already gone or taken over");
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "lock release failed, waiting for expiry");
            }
        }
    }

    /// Get counter snapshot.
    pub fn stats(&self) -> LockStats {
        LockStats {
            attempts: self.metrics.attempts.load(Ordering::Relaxed),
            acquired: self.metrics.acquired.load(Ordering::Relaxed),
            conflicts: self.metrics.conflicts.load(Ordering::Relaxed),
            transport_errors: self.metrics.transport_errors.load(Ordering::Relaxed),
            renewals: self.metrics.renewals.load(Ordering::Relaxed),
            renew_failures: self.metrics.renew_failures.load(Ordering::Relaxed),
            releases: self.metrics.releases.load(Ordering::Relaxed),
        }
    }
}
