use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Engine knobs: fan-out width, dispatch-start throttle and per-call timeout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of dispatches executing at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Dispatch starts allowed per rolling window.
    #[serde(default = "default_rate_limit_per_window")]
    pub rate_limit_per_window: usize,

    /// Length of the rolling window in seconds.
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,

    /// Per-call timeout; `None` or 0 disables it.
    #[serde(default = "default_per_call_timeout_ms")]
    pub per_call_timeout_ms: Option<u64>,
}

fn default_concurrency_limit() -> usize {
    16
}

fn default_rate_limit_per_window() -> usize {
    1000
}

fn default_window_seconds() -> u64 {
    60
}

fn default_per_call_timeout_ms() -> Option<u64> {
    Some(120_000)
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            rate_limit_per_window: default_rate_limit_per_window(),
            window_seconds: default_window_seconds(),
            per_call_timeout_ms: default_per_call_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.max(1))
    }

    pub fn per_call_timeout(&self) -> Option<Duration> {
        self.per_call_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// "exponential-backoff" or "linear".
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Total dispatches allowed per task, first attempt included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Spread retry delays to avoid synchronized retry storms.
    #[serde(default = "default_jitter")]
    pub jitter: bool,

    /// Attach a repair hint to the payload when retrying a malformed response.
    #[serde(default)]
    pub repair_hint: bool,
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
            jitter: default_jitter(),
            repair_hint: false,
        }
    }
}

/// Prices used to turn usage totals into a cost estimate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Price per one million input tokens.
    #[serde(default)]
    pub input_per_million: f64,

    /// Price per one million output tokens.
    #[serde(default)]
    pub output_per_million: f64,
}
