//! In-process mirrors of shared-store entries.
//!
//! - [`body`] - Mirror bodies: whole snapshot or keyed projection
//! - [`registry`] - Logical key → body, read path
//! - [`poller`] - Background reload on tick or signal

pub mod body;
pub mod poller;
pub mod registry;
