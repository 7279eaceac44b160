//! Poll pacing after failed cycles
//!
//! A cycle that fails (scan error or payout failure) is retried after
//! `poll_interval * multiplier^(failures - 1)`, capped at `max_backoff`.
//! With the default multiplier of 1.0 the relay simply polls at a fixed rate.

use std::time::Duration;

use crate::config::RelayConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between healthy cycles
    pub poll_interval: Duration,
    /// Ceiling for the delay after failures
    pub max_backoff: Duration,
    /// Growth factor per consecutive failure
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_backoff: Duration::from_secs(300),
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RelayConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            max_backoff: Duration::from_secs(config.max_backoff_secs),
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Delay before the next cycle given the current failure streak.
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return self.poll_interval;
        }

        let exponent = consecutive_failures.saturating_sub(1).min(64) as i32;
        let secs = self.poll_interval.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped.max(self.poll_interval.as_secs_f64()))
    }
}
