//! Refresh timing derivation.
//!
//! Every refresh loop derives its lock TTL, shared-store TTL and jittered
//! sleep from one base period (`timer_ttl`):
//!
//! - `lock_ttl  = timer_ttl × lock_ttl_factor` (default 1.5)
//! - `cache_ttl = timer_ttl × cache_ttl_factor` (default 10)
//! - `sleep_ttl = timer_ttl / 2 × jitter`, jitter ∈ [0.8, 1.2)
//!
//! Jitter is a pure function of the holder identity, so peers spread their
//! election attempts while any single process stays reproducible.

use crate::core::config::RefreshConfig;
use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::time::Duration;
use twox_hash::XxHash64;

/// Lower bound of the jitter multiplier.
pub const JITTER_MIN: f64 = 0.8;

/// Upper bound of the jitter multiplier (exclusive).
pub const JITTER_MAX: f64 = 1.2;

/// Multipliers applied to the base refresh period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TtlFactors {
    /// Lock TTL multiple.
    pub lock: f64,
    /// Shared-store TTL multiple.
    pub cache: u32,
}

impl Default for TtlFactors {
    fn default() -> Self {
        Self {
            lock: 1.5,
            cache: 10,
        }
    }
}

impl From<&RefreshConfig> for TtlFactors {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            lock: config.lock_ttl_factor,
            cache: config.cache_ttl_factor,
        }
    }
}

/// Compute the jitter multiplier for a holder identity.
///
/// `1 + ((h mod 1000) - 500) / 2500` where `h` is the xxHash64 of the
/// identity, giving a value in `[0.8, 1.2)`.
pub fn jitter_for(holder: &str) -> f64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(holder.as_bytes());
    let bucket = (hasher.finish() % 1000) as f64;
    1.0 + (bucket - 500.0) / 2500.0
}

/// Durations derived from one base refresh period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RefreshTimings {
    /// Base refresh period; the leader recomputes once per period.
    pub timer_ttl: Duration,
    /// TTL of the leadership lock.
    pub lock_ttl: Duration,
    /// TTL of the published shared-store entry.
    pub cache_ttl: Duration,
    /// Pause between election attempts.
    pub sleep_ttl: Duration,
    /// Jitter multiplier that produced `sleep_ttl`.
    pub jitter: f64,
}

impl RefreshTimings {
    /// Derive timings for `holder` from the base period and factors.
    pub fn derive(timer_ttl: Duration, holder: &str, factors: TtlFactors) -> Self {
        let jitter = jitter_for(holder);
        Self {
            timer_ttl,
            lock_ttl: timer_ttl.mul_f64(factors.lock),
            cache_ttl: timer_ttl * factors.cache,
            sleep_ttl: (timer_ttl / 2).mul_f64(jitter),
            jitter,
        }
    }

    /// Derive timings with the default factors.
    pub fn with_defaults(timer_ttl: Duration, holder: &str) -> Self {
        Self::derive(timer_ttl, holder, TtlFactors::default())
    }

    /// Lock TTL in whole seconds, rounded up and at least one.
    pub fn lock_ttl_seconds(&self) -> u64 {
        ceil_seconds(self.lock_ttl)
    }

    /// Shared-store TTL in whole seconds, rounded up and at least one.
    pub fn cache_ttl_seconds(&self) -> u64 {
        ceil_seconds(self.cache_ttl)
    }
}

/// Round a duration up to whole seconds, never returning zero.
pub fn ceil_seconds(d: Duration) -> u64 {
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_is_stable_for_an_identity() {
        assert_eq!(jitter_for("node-a:4001"), jitter_for("node-a:4001"));
    }

    #[test]
    fn default_factors_match_documented_multiples() {
        let t = RefreshTimings::with_defaults(Duration::from_secs(10), "node-a:4001");
        assert_eq!(t.lock_ttl, Duration::from_secs(15));
        assert_eq!(t.cache_ttl, Duration::from_secs(100));
        assert_eq!(t.lock_ttl_seconds(), 15);
    }

    #[test]
    fn ceil_seconds_rounds_up() {
        assert_eq!(ceil_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ceil_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ceil_seconds(Duration::from_secs(3)), 3);
        assert_eq!(ceil_seconds(Duration::ZERO), 1);
    }
}
