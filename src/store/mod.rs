//! Shared TTL store access.
//!
//! - [`key`] - Cache keys and backend key qualification
//! - [`entry`] - Field mappings, entries and the export/import capability
//! - [`gateway`] - Get/put against the shared store

pub mod entry;
pub mod gateway;
pub mod key;
