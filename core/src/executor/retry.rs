//! Default retry policy: capped exponential backoff.

use std::time::Duration;

use rand::Rng;

use super::traits::RetryStrategyPlugin;
use super::types::RetryConfig;

/// Upper bound of the random spread added to a delay, as a fraction of it.
const JITTER_FRACTION: f64 = 0.25;

/// `delay = min(base * 2^(attempt-1), max_delay)`, optionally jittered.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max_delay: Duration,
    max_attempts: u32,
    jitter: bool,
}

impl ExponentialBackoff {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            base: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms.max(config.base_delay_ms)),
            max_attempts: config.max_attempts.max(1),
            jitter: config.jitter,
        }
    }

    /// Deterministic part of the delay after `attempt` dispatches.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(30);
        let factor = 1u32 << exp;
        self.base.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryStrategyPlugin for ExponentialBackoff {
    fn name(&self) -> &str {
        "exponential-backoff"
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff(attempt);
        if !self.jitter {
            return delay;
        }
        let fraction = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
        delay.saturating_add(delay.mul_f64(fraction)).min(self.max_delay)
    }
}
