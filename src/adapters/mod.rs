//! Backend adapters.
//!
//! fleetcache talks to two external services through small contracts:
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────┐
//! │   CoordinationBackend    │        │       SharedStore        │
//! │                          │        │                          │
//! │  - create_if_absent      │        │  - put(ns, set, pk, ttl) │
//! │  - compare_and_swap      │        │  - get(ns, set, pk,      │
//! │  - compare_and_delete    │        │        field names)      │
//! └──────────────────────────┘        └──────────────────────────┘
//!        ▲            ▲                      ▲
//!   etcd v2 HTTP   in-memory            in-memory
//! ```
//!
//! Transport failures are reported as `Err(CacheError::Transport)`; every
//! other answer is a [`CoordOutcome`] so callers can tell a lost race from
//! an unreachable service.
//!
//! Currently implemented:
//! - [`memory`] - in-process coordination service and shared store
//! - [`etcd`] - etcd v2 keys API coordination adapter (feature `etcd-http`)

use crate::core::error::{CacheError, CacheResult};
use crate::store::entry::{CacheEntry, Fields};
use crate::store::key::StoreKey;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

#[cfg(feature = "etcd-http")]
pub mod etcd;
pub mod memory;

/// Boxed future returned by backend contracts.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a coordination request that reached the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordOutcome {
    /// The write was applied; `revision` is the node's new modification index.
    Applied { revision: u64 },
    /// The node exists with a different value or revision.
    Conflict,
    /// No node exists at the path.
    NotFound,
}

impl CoordOutcome {
    /// Revision of an applied write.
    pub fn revision(&self) -> Option<u64> {
        match self {
            Self::Applied { revision } => Some(*revision),
            _ => None,
        }
    }

    /// Check if the write was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }

    /// Revision of an applied write, or the error describing why `path`
    /// was not written.
    pub fn into_revision(self, path: &str) -> CacheResult<u64> {
        match self {
            Self::Applied { revision } => Ok(revision),
            Self::Conflict => Err(CacheError::conflict(path)),
            Self::NotFound => Err(CacheError::not_found(path)),
        }
    }
}

/// Preconditions for a compare-and-swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCondition {
    /// Value the node must currently hold.
    pub prev_value: String,
    /// Modification index the node must currently have, if checked.
    pub prev_revision: Option<u64>,
}

impl SwapCondition {
    /// Compare on value only.
    pub fn value(prev_value: impl Into<String>) -> Self {
        Self {
            prev_value: prev_value.into(),
            prev_revision: None,
        }
    }

    /// Compare on value and revision.
    pub fn value_and_revision(prev_value: impl Into<String>, revision: u64) -> Self {
        Self {
            prev_value: prev_value.into(),
            prev_revision: Some(revision),
        }
    }
}

/// Distributed create / compare-and-swap / delete primitive.
pub trait CoordinationBackend: Send + Sync {
    /// Backend name for logs (e.g., "etcd", "memory").
    fn name(&self) -> &'static str;

    /// Create `path` holding `value` with a TTL, only if it does not exist.
    fn create_if_absent<'a>(
        &'a self,
        path: &'a str,
        value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>>;

    /// Replace `path` with `new_value` and a fresh TTL if `condition` holds.
    fn compare_and_swap<'a>(
        &'a self,
        path: &'a str,
        condition: &'a SwapCondition,
        new_value: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>>;

    /// Delete `path` if it still holds `prev_value`.
    fn compare_and_delete<'a>(
        &'a self,
        path: &'a str,
        prev_value: &'a str,
    ) -> BoxFuture<'a, CacheResult<CoordOutcome>>;
}

/// Fleet-wide TTL key/value store holding published entries.
pub trait SharedStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Write an entry, replacing any previous one.
    fn put<'a>(&'a self, key: &'a StoreKey, entry: CacheEntry) -> BoxFuture<'a, CacheResult<()>>;

    /// Read the named fields of an entry; `Ok(None)` when it does not exist.
    fn get<'a>(
        &'a self,
        key: &'a StoreKey,
        field_names: &'a [String],
    ) -> BoxFuture<'a, CacheResult<Option<Fields>>>;
}
