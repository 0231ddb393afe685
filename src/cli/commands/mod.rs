//! CLI command implementations.

mod config;
mod timings;

pub use config::{run_config, ConfigArgs, ConfigCommand, OverrideArgs};
pub use timings::{render_timings, run_timings, TimingsArgs};
