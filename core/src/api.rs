//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `skillbatch_core::api` instead of reaching into internal modules.

pub use crate::config::{load_default, AppConfig, BackendConfig, LoggingConfig};
pub use crate::error::{CliError, ConfigError, ExecutorError};
pub use crate::executor::traits::{
    InvokeRequest, Invoker, OutputRendererPlugin, PayloadProcessorPlugin, ProcessContext,
    RenderEvent, ResendUnchanged, RetryDecision, RetryStrategyPlugin,
};
pub use crate::executor::types::{
    BatchResult, EngineConfig, FailureKind, FunctionDefinition, InvokeFailure, InvokeResponse,
    Outcome, PricingConfig, ProcessorError, ProgressSnapshot, RetryConfig, Task, TaskEntry, Usage,
};
pub use crate::executor::{
    BatchRun, CancelToken, ExponentialBackoff, ParallelEngine, ParallelEngineBuilder,
    ProgressMonitor, ResultAggregator, SlidingWindowLimiter,
};
