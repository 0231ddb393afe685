//! Core runtime infrastructure.
//!
//! - [`config`] - Configuration parsing and validation
//! - [`error`] - Error taxonomy
//! - [`time`] - Refresh timing derivation and jitter
//! - [`runtime`] - The [`Coordinator`](runtime::Coordinator) object

pub mod config;
pub mod error;
pub mod runtime;
pub mod time;
