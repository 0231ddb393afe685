//! fleetcache - one leader computes, every process reads locally.
//!
//! A fleet of equivalent processes shares one expensive, periodically
//! refreshed value. For each managed key exactly one process (the leader,
//! holder of a lock on the coordination service) runs the producer and
//! publishes the result to a shared TTL store. Every process keeps a local
//! mirror of the published value, reloaded on a schedule or on signal, so
//! reads never cross the network.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          Coordinator                            │
//! │       holder identity │ shutdown channel │ task ownership       │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                                          │
//! ┌──────────────────────────────┐   ┌──────────────────────────────┐
//! │   RefreshLoop (one per key)  │   │   LocalCachePoller (one)     │
//! │  elect → produce → publish   │──►│  tick / reload → renew bodies│
//! └──────────────────────────────┘   └──────────────────────────────┘
//!          │              │                   │              │
//! ┌──────────────┐ ┌──────────────────────────────┐ ┌──────────────────┐
//! │ LockManager  │ │     SharedCacheGateway       │ │LocalCacheRegistry│
//! └──────────────┘ └──────────────────────────────┘ └──────────────────┘
//!          │                      │                          ▲
//! ┌──────────────────┐  ┌──────────────────┐             readers
//! │CoordinationBackend│ │   SharedStore    │
//! └──────────────────┘  └──────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error taxonomy
//! - [`core::time`] - Refresh timing derivation and jitter
//! - [`core::runtime`] - The coordinator object
//!
//! ## Backends
//! - [`adapters`] - Coordination and shared-store contracts
//! - [`adapters::memory`] - In-process backends with fault injection
//! - `adapters::etcd` - etcd v2 keys API coordination (feature `etcd-http`)
//!
//! ## Election
//! - [`election::lock`] - Lock acquire/renew/release
//! - [`election::refresh`] - Per-key refresh loop and producers
//!
//! ## Shared store
//! - [`store::key`] - Key model
//! - [`store::entry`] - Entries and export/import
//! - [`store::gateway`] - Get/put with retries
//!
//! ## Local mirrors
//! - [`local::body`] - Mirror bodies
//! - [`local::registry`] - Registry and read path
//! - [`local::poller`] - Reload task
//!
//! # Guarantees
//!
//! - At most one process holds the lock for a key at any instant: locks are
//!   taken with create-if-absent and renewed with compare-and-swap on the
//!   last observed value and revision.
//! - Shared-store entries outlive several refresh periods, so a leader
//!   crash does not blank the cache before a new leader is elected.
//! - A local mirror lags the shared store by at most one poll interval;
//!   every publish also signals the local poller.

pub mod adapters;
pub mod cli;
pub mod core;
pub mod election;
pub mod local;
pub mod store;

pub use crate::core::config::Config;
pub use crate::core::error::{CacheError, CacheResult};
pub use crate::core::runtime::Coordinator;
pub use crate::core::time::RefreshTimings;
pub use crate::election::refresh::{producer_fn, Producer};
pub use crate::local::body::{CacheBody, KeyedBody, SnapshotBody};
