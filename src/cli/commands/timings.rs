//! Timings command implementation.

use crate::core::config::MIN_CACHE_TTL_FACTOR;
use crate::core::time::{RefreshTimings, TtlFactors};
use anyhow::Result;
use clap::Args;
use std::time::Duration;

/// Show the lock, cache and sleep durations a holder would use.
#[derive(Args, Debug)]
pub struct TimingsArgs {
    /// Holder identity (`host:port`).
    #[arg(long)]
    pub holder: String,

    /// Base refresh period in seconds.
    #[arg(long, default_value_t = 1037)]
    pub timer_ttl_seconds: u64,

    /// Lock TTL multiple of the base period.
    #[arg(long, default_value_t = 1.5)]
    pub lock_ttl_factor: f64,

    /// Shared-store TTL multiple of the base period.
    #[arg(long, default_value_t = 10)]
    pub cache_ttl_factor: u32,
}

/// Run the timings command.
pub fn run_timings(args: TimingsArgs) -> Result<()> {
    if args.timer_ttl_seconds == 0 {
        anyhow::bail!("--timer-ttl-seconds must be > 0");
    }
    if !(args.lock_ttl_factor > 1.0) {
        anyhow::bail!("--lock-ttl-factor must be > 1.0");
    }
    if args.cache_ttl_factor < MIN_CACHE_TTL_FACTOR {
        anyhow::bail!("--cache-ttl-factor must be >= {}", MIN_CACHE_TTL_FACTOR);
    }

    let factors = TtlFactors {
        lock: args.lock_ttl_factor,
        cache: args.cache_ttl_factor,
    };
    let timings = RefreshTimings::derive(
        Duration::from_secs(args.timer_ttl_seconds),
        &args.holder,
        factors,
    );
    print!("{}", render_timings(&args.holder, &timings));
    Ok(())
}

/// Human-readable timing table.
pub fn render_timings(holder: &str, timings: &RefreshTimings) -> String {
    format!(
        "holder:    {}\n\
         timer_ttl: {:?}\n\
         lock_ttl:  {:?} ({}s on the coordination service)\n\
         cache_ttl: {:?} ({}s in the shared store)\n\
         sleep_ttl: {:?}\n\
         jitter:    {:.4}\n",
        holder,
        timings.timer_ttl,
        timings.lock_ttl,
        timings.lock_ttl_seconds(),
        timings.cache_ttl,
        timings.cache_ttl_seconds(),
        timings.sleep_ttl,
        timings.jitter,
    )
}
