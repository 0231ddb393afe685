//! fleetcache - operator CLI.
//!
//! Usage:
//!   fleetcache config validate --config config/fleetcache.toml [--timer-ttl-seconds 60] [--host node-a]
//!   fleetcache config show --config config/fleetcache.toml [--format json]
//!   fleetcache config generate [--output path]
//!   fleetcache timings --holder node-a:4001 [--timer-ttl-seconds 1037]

use anyhow::Result;
use clap::Parser;
use fleetcache::cli::commands::{run_config, run_timings};
use fleetcache::cli::{init_tracing, resolve_log_level, Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&resolve_log_level(&cli));

    match cli.command {
        Commands::Config(args) => run_config(args, cli.log_level.as_deref()),
        Commands::Timings(args) => run_timings(args),
    }
}
