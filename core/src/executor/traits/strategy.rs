use std::time::Duration;

use crate::executor::types::FailureKind;

/// What to do with a task after a failed dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

/// Retry strategy plugin.
///
/// `attempt` is the number of dispatches already made for the task (>= 1).
pub trait RetryStrategyPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// Total dispatches allowed per task, first attempt included.
    fn max_attempts(&self) -> u32;

    /// Delay before dispatch number `attempt + 1`.
    fn next_delay(&self, attempt: u32) -> Duration;

    fn decide(&self, kind: FailureKind, attempt: u32) -> RetryDecision {
        if !kind.is_retriable() || attempt >= self.max_attempts() {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.next_delay(attempt),
        }
    }
}
