use std::time::Duration;

use skillbatch_core::api::{RetryConfig, RetryStrategyPlugin};

/// `delay = min(base * attempt, max_delay)`, no jitter.
pub struct LinearRetryPlugin {
    config: RetryConfig,
}

impl LinearRetryPlugin {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl RetryStrategyPlugin for LinearRetryPlugin {
    fn name(&self) -> &str {
        "linear"
    }

    fn next_delay(&self, attempt: u32) -> Duration {
        let multiplier = attempt.max(1) as u64;
        let delay = self.config.base_delay_ms.saturating_mul(multiplier);
        let delay = delay.min(self.config.max_delay_ms.max(self.config.base_delay_ms));
        Duration::from_millis(delay)
    }

    fn max_attempts(&self) -> u32 {
        self.config.max_attempts.max(1)
    }
}
