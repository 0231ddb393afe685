//! In-process backends.
//!
//! Both backends honour TTLs against tokio's clock and support fault
//! injection, so embedders can run a coordinator without external services
//! and tests can simulate outages, lost races and lock theft.

mod coordination;
mod store;

pub use coordination::MemoryCoordination;
pub use store::MemoryStore;
