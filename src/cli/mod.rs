//! Command-line interface.
//!
//! Operator tooling for fleetcache configuration and timing.

pub mod commands;

use crate::core::config::Config;
use clap::{Parser, Subcommand};

/// fleetcache - leader-elected shared computation with local mirrors.
#[derive(Parser, Debug)]
#[command(name = "fleetcache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration operations.
    Config(commands::ConfigArgs),
    /// Show refresh timings derived for a holder identity.
    Timings(commands::TimingsArgs),
}

/// Level to start logging at.
///
/// `--log-level` wins; otherwise a config command uses `telemetry.log_level`
/// from its file, and everything else logs at `info`.
pub fn resolve_log_level(cli: &Cli) -> String {
    if let Some(ref level) = cli.log_level {
        return level.clone();
    }
    let configured = match cli.command {
        Commands::Config(ref args) => args
            .config_path()
            .and_then(|path| Config::from_file(path).ok())
            .map(|config| config.telemetry.log_level),
        Commands::Timings(_) => None,
    };
    configured.unwrap_or_else(|| "info".to_string())
}

/// Initialize the tracing subscriber if the telemetry feature is enabled.
///
/// `RUST_LOG` wins over `default_level`.
#[cfg(feature = "telemetry")]
pub fn init_tracing(default_level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A subscriber may already be installed by an embedding host.
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}

#[cfg(not(feature = "telemetry"))]
pub fn init_tracing(_default_level: &str) {}
