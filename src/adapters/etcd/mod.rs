//! etcd v2 keys API coordination adapter.
//!
//! Maps the coordination contract onto conditional keys API requests:
//!
//! ```text
//! create_if_absent   PUT    /v2/keys/<path>?prevExist=false      value, ttl
//! compare_and_swap   PUT    /v2/keys/<path>?prevValue=..&prevIndex=..  value, ttl
//! compare_and_delete DELETE /v2/keys/<path>?prevValue=..
//! ```
//!
//! # Modules
//!
//! - [`keys`] - Response types and outcome mapping
//! - [`client`] - HTTP client with endpoint failover

pub mod client;
pub mod keys;

pub use client::EtcdHttpCoordination;
pub use keys::{classify, EtcdNode, EtcdResponse};
