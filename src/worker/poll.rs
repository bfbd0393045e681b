//! Polling configuration for the monitor loop.
//!
//! # Polling Strategy
//!
//! - **Poll interval**: 15 seconds by default
//! - **Provider timeout**: 10 seconds by default. This bounds a single listing
//!   call and is independent of the stuck tolerance.
//! - **Degraded threshold**: after 3 consecutive failed polls the loop reports
//!   the provider as degraded.

use std::time::Duration;

/// Default poll interval (15 seconds).
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 15;

/// Default timeout for one provider listing call (10 seconds).
pub const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 10;

/// Default number of consecutive failures before reporting degraded.
pub const DEFAULT_DEGRADED_AFTER: u32 = 3;

/// Configuration for the poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Interval between poll ticks.
    pub poll_interval: Duration,

    /// Upper bound on one provider listing call.
    ///
    /// A call that exceeds this is cancelled and counted as a transient
    /// failure.
    pub provider_timeout: Duration,

    /// Consecutive failures after which the provider is reported degraded.
    pub degraded_after: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PollConfig {
    /// Creates a new `PollConfig` with default values.
    pub fn new() -> Self {
        PollConfig {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            degraded_after: DEFAULT_DEGRADED_AFTER,
        }
    }

    /// Returns true if `consecutive_failures` has just reached the degraded
    /// threshold. Fires once per failure streak.
    pub fn just_degraded(&self, consecutive_failures: u32) -> bool {
        self.degraded_after > 0 && consecutive_failures == self.degraded_after
    }

    /// Returns true if the provider is currently considered degraded.
    pub fn is_degraded(&self, consecutive_failures: u32) -> bool {
        self.degraded_after > 0 && consecutive_failures >= self.degraded_after
    }
}
