//! Reconnect delay policy

use crate::config::SessionConfig;
use std::time::Duration;

/// Delay between consecutive failed reconnect attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Floor, and the delay after the first failure
    pub min_delay: Duration,
    /// Cap once the delay has grown
    pub max_delay: Duration,
    /// Grow quadratically instead of linearly
    pub exponential: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(120),
            exponential: true,
        }
    }
}

impl ReconnectPolicy {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            min_delay: Duration::from_secs(config.session.reconnect_delay_min_secs),
            max_delay: Duration::from_secs(config.session.reconnect_delay_max_secs),
            exponential: config.session.reconnect_exponential,
        }
    }

    /// Pause after `attempt` consecutive failures (1-based)
    ///
    /// `min * n` or `min * n * n`, capped at `max`. A policy whose maximum
    /// does not exceed its minimum always waits `min`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }

        let n = attempt.max(1);
        let factor = if self.exponential {
            n.saturating_mul(n)
        } else {
            n
        };

        self.min_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}
