//! Leader election and periodic recomputation.
//!
//! - [`lock`] - Lock acquire/renew/release on the coordination service
//! - [`refresh`] - Per-key refresh loop and the producer contract

pub mod lock;
pub mod refresh;
