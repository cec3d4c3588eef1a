//! Sliding-window throttle on dispatch starts.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use super::types::EngineConfig;

/// Bounds the number of dispatch starts within any trailing window.
///
/// A grant made at `t` counts against every decision in `[t, t + window)` and
/// then ages out on its own; completion of the dispatched work plays no part.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    limit: usize,
    window: Duration,
    starts: Mutex<VecDeque<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        let limit = limit.max(1);
        Self {
            limit,
            window,
            starts: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.rate_limit_per_window, config.window())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a start is allowed, then record it.
    pub async fn acquire(&self) {
        loop {
            let wake_at = {
                let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
                let now = Instant::now();
                self.prune(&mut starts, now);
                if starts.len() < self.limit {
                    starts.push_back(now);
                    return;
                }
                // Full window: the oldest grant is the next to age out.
                match starts.front() {
                    Some(oldest) => *oldest + self.window,
                    None => now,
                }
            };
            tracing::trace!(
                wait = ?wake_at.saturating_duration_since(Instant::now()),
                "rate limit reached, waiting for window to slide"
            );
            tokio::time::sleep_until(wake_at).await;
        }
    }

    /// Grants still available in the current window.
    pub fn available(&self) -> usize {
        let mut starts = self.starts.lock().unwrap_or_else(PoisonError::into_inner);
        self.prune(&mut starts, Instant::now());
        self.limit - starts.len()
    }

    fn prune(&self, starts: &mut VecDeque<Instant>, now: Instant) {
        while let Some(oldest) = starts.front() {
            if *oldest + self.window <= now {
                starts.pop_front();
            } else {
                break;
            }
        }
    }
}
