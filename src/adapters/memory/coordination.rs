//! In-memory coordination service.
//!
//! Nodes carry a value, a modification revision and an expiry deadline.
//! The revision counter is global and strictly increasing, like an etcd
//! index. Expired nodes are purged lazily on access, using tokio's clock so
//! paused-time tests see TTLs elapse.

use crate::adapters::{BoxFuture, CoordOutcome, CoordinationBackend, SwapCondition};
use crate::core::error::{CacheError, CacheResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Node {
    value: String,
    revision: u64,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct CoordState {
    nodes: HashMap<String, Node>,
    revision: u64,
}

impl CoordState {
    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    /// Drop the node at `path` if its TTL has passed.
    fn purge_expired(&mut self, path: &str, now: Instant) {
        let expired = self
            .nodes
            .get(path)
            .map(|node| now >= node.expires_at)
            .unwrap_or(false);
        if expired {
            self.nodes.remove(path);
        }
    }
}

/// Coordination service held in process memory.
#[derive(Debug, Default)]
pub struct MemoryCoordination {
    state: Mutex<CoordState>,
    unavailable: AtomicBool,
    requests: AtomicU64,
}

impl MemoryCoordination {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every request fail with a transport error while `true`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    /// Overwrite a node regardless of its holder, as a peer stealing it would.
    pub fn force_set(&self, path: &str, value: &str, ttl: Duration) -> u64 {
        let mut state = self.state.lock();
        let revision = state.next_revision();
        state.nodes.insert(
            path.to_string(),
            Node {
                value: value.to_string(),
                revision,
                expires_at: Instant::now() + ttl,
            },
        );
        revision
    }

    /// Remove a node, as if its TTL had elapsed.
    pub fn expire(&self, path: &str) -> bool {
        self.state.lock().nodes.remove(path).is_some()
    }

    /// Current value at `path`, if live.
    pub fn value_of(&self, path: &str) -> Option<String> {
        let mut state = self.state.lock();
        state.purge_expired(path, Instant::now());
        state.nodes.get(path).map(|n| n.value.clone())
    }

    /// Current revision at `path`, if live.
    pub fn revision_of(&self, path: &str) -> Option<u64> {
        let mut state = self.state.lock();
        state.purge_expired(path, Instant::now());
        state.nodes.get(path).map(|n| n.revision)
    }

    /// Total requests received, including failed ones.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    fn check_available(&self) -> CacheResult<()> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Acquire) {
            return Err(CacheError::transport("coordination service unavailable"));
        }
        Ok(())
    }

    fn create_sync(&self, path: &str, value: &str, ttl: Duration) -> CacheResult<CoordOutcome> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock();
        state.purge_expired(path, now);
        if state.nodes.contains_key(path) {
            return Ok(CoordOutcome::Conflict);
        }
        let revision = state.next_revision();
        state.nodes.insert(
            path.to_string(),
            Node {
                value: value.to_string(),
                revision,
                expires_at: now + ttl,
            },
        );
        Ok(CoordOutcome::Applied { revision })
    }

    fn swap_sync(
        &self,
        path: &str,
        condition: &SwapCondition,
        new_value: &str,
        ttl: Duration,
    ) -> CacheResult<CoordOutcome> {
        self.check_available()?;
        let now = Instant::now();
        let mut state = self.state.lock();
        state.purge_expired(path, now);
        let Some(node) = state.nodes.get(path) else {
            return Ok(CoordOutcome::NotFound);
        };
        if node.value != condition.prev_value {
            return Ok(CoordOutcome::Conflict);
        }
        if let Some(prev_revision) = condition.prev_revision {
            if node.revision != prev_revision {
                return Ok(CoordOutcome::Conflict);
            }
        }
        let revision = state.next_revision();
        state.nodes.insert(
            path.to_string(),
            Node {
                value: new_value.to_string(),
                revision,
                expires_at: now + ttl,
            },
        );
        Ok(CoordOutcome::Applied { revision })
    }

    fn delete_sync(&self, path: &str, prev_value: &str) -> CacheResult<CoordOutcome> {
        self.check_available()?;
        let mut state = self.state.lock();
        state.purge_expired(path, Instant::now());
        match state.nodes.get(path) {
            None => Ok(CoordOutcome::NotFound),
            Some(node) if node.value != prev_value => Ok(CoordOutcome::Conflict),
            Some(_) => {
                state.nodes.remove(path);
                let revision = state.next_revision();
                Ok(CoordOutcome::Applied { revision })
            }
        }
    }
}

impl CoordinationBackend for MemoryCoordination {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn create_if_absent<'a>(
        &'a self,
        path: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>> {
        Box::pin(async move { self.create_sync(path, value, ttl) })
    }

    fn compare_and_swap<'a>(
        &'a self,
        path: &'a str,
        condition: &'a SwapCondition,
        new_value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>> {
        Box::pin(async move { self.swap_sync(path, condition, new_value, ttl) })
    }

    fn compare_and_delete<'a>(
        &'a self,
        path: &'a str,
        prev_value: &'a str,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>> {
        Box::pin(async move { self.delete_sync(path, prev_value) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn create_conflicts_until_ttl_elapses() {
        let coord = MemoryCoordination::new();
        let ttl = Duration::from_secs(15);

        let first = coord.create_if_absent("/l/a", "node-a", ttl).await.unwrap();
        assert!(first.is_applied());

        let second = coord.create_if_absent("/l/a", "node-b", ttl).await.unwrap();
        assert_eq!(second, CoordOutcome::Conflict);

        tokio::time::advance(Duration::from_secs(16)).await;
        let third = coord.create_if_absent("/l/a", "node-b", ttl).await.unwrap();
        assert!(third.is_applied());
        assert_eq!(coord.value_of("/l/a").as_deref(), Some("node-b"));
    }

    #[tokio::test]
    async fn swap_checks_value_and_revision() {
        let coord = MemoryCoordination::new();
        let ttl = Duration::from_secs(15);
        let rev = coord
            .create_if_absent("/l/a", "node-a", ttl)
            .await
            .unwrap()
            .revision()
            .unwrap();

        let wrong_value = SwapCondition::value("node-b");
        assert_eq!(
            coord.compare_and_swap("/l/a", &wrong_value, "node-b", ttl).await.unwrap(),
            CoordOutcome::Conflict
        );

        let good = SwapCondition::value_and_revision("node-a", rev);
        let renewed = coord.compare_and_swap("/l/a", &good, "node-a", ttl).await.unwrap();
        assert!(renewed.revision().unwrap() > rev);

        // Same condition again now carries a stale revision.
        assert_eq!(
            coord.compare_and_swap("/l/a", &good, "node-a", ttl).await.unwrap(),
            CoordOutcome::Conflict
        );
    }

    #[tokio::test]
    async fn delete_requires_matching_value() {
        let coord = MemoryCoordination::new();
        let ttl = Duration::from_secs(15);
        coord.create_if_absent("/l/a", "node-a", ttl).await.unwrap();

        assert_eq!(
            coord.compare_and_delete("/l/a", "node-b").await.unwrap(),
            CoordOutcome::Conflict
        );
        assert!(coord.compare_and_delete("/l/a", "node-a").await.unwrap().is_applied());
        assert_eq!(
            coord.compare_and_delete("/l/a", "node-a").await.unwrap(),
            CoordOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn unavailable_service_reports_transport_errors() {
        let coord = MemoryCoordination::new();
        coord.set_unavailable(true);
        let err = coord
            .create_if_absent("/l/a", "node-a", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(coord.request_count(), 1);
    }
}
