//! Batch executor for independent structured-generation tasks.
//!
//! # Architecture
//!
//! ```text
//! Vec<Task>
//!   ↓
//! ParallelEngine::spawn() → BatchRun { progress(), cancel(), wait() }
//!   ↓ per task, up to `concurrency_limit` at once
//! Semaphore slot → SlidingWindowLimiter::acquire() → Invoker::invoke()
//!   ↓                                          (per-call timeout → Transient)
//! schema::validate_result()                    (violation → Malformed)
//!   ↓
//! RetryStrategyPlugin::decide() ── Retry{delay} → sleep → PayloadProcessorPlugin → redispatch
//!   ↓ GiveUp / Success
//! ResultAggregator::record() → finalize() → BatchResult
//! ```

mod aggregator;
mod cancel;
mod engine;
mod progress;
mod rate_limit;
mod retry;
pub mod schema;
pub mod traits;
pub mod types;

pub use aggregator::ResultAggregator;
pub use cancel::CancelToken;
pub use engine::{BatchRun, ParallelEngine, ParallelEngineBuilder};
pub use progress::ProgressMonitor;
pub use rate_limit::SlidingWindowLimiter;
pub use retry::ExponentialBackoff;
pub use types::{BatchResult, EngineConfig, ProgressSnapshot, Task, TaskEntry};

#[cfg(test)]
mod tests;
