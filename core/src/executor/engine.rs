use std::sync::Arc;

use futures::stream::FuturesUnordered;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::ExecutorError;

use super::aggregator::ResultAggregator;
use super::cancel::CancelToken;
use super::rate_limit::SlidingWindowLimiter;
use super::retry::ExponentialBackoff;
use super::schema::validate_result;
use super::traits::{
    InvokeRequest, Invoker, OutputRendererPlugin, PayloadProcessorPlugin, ProcessContext,
    RenderEvent, ResendUnchanged, RetryDecision, RetryStrategyPlugin,
};
use super::types::{
    BatchResult, EngineConfig, InvokeFailure, InvokeResponse, Outcome, ProgressSnapshot, Task,
};

/// Runs a batch of independent tasks against an [`Invoker`].
///
/// Dispatches are fanned out up to the concurrency limit, every dispatch
/// start is gated by the shared rate limiter, and failed dispatches go
/// through the retry strategy. A task's failure is recorded against that
/// task only; the run always proceeds until every task is terminal or the
/// run is cancelled.
#[derive(Clone)]
pub struct ParallelEngine {
    invoker: Arc<dyn Invoker>,
    limiter: Arc<SlidingWindowLimiter>,
    retry_strategy: Arc<dyn RetryStrategyPlugin>,
    processor: Arc<dyn PayloadProcessorPlugin>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    config: EngineConfig,
}

pub struct ParallelEngineBuilder {
    invoker: Arc<dyn Invoker>,
    limiter: Option<Arc<SlidingWindowLimiter>>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
    processor: Option<Arc<dyn PayloadProcessorPlugin>>,
    renderer: Option<Arc<dyn OutputRendererPlugin>>,
    config: EngineConfig,
}

impl ParallelEngineBuilder {
    pub fn new(invoker: Arc<dyn Invoker>) -> Self {
        Self {
            invoker,
            limiter: None,
            retry_strategy: None,
            processor: None,
            renderer: None,
            config: EngineConfig::default(),
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Share a limiter across engines; otherwise one is built from the config.
    pub fn rate_limiter(mut self, limiter: Arc<SlidingWindowLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn processor(mut self, processor: Arc<dyn PayloadProcessorPlugin>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn OutputRendererPlugin>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> ParallelEngine {
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(SlidingWindowLimiter::from_config(&self.config)));
        ParallelEngine {
            invoker: self.invoker,
            limiter,
            retry_strategy: self
                .retry_strategy
                .unwrap_or_else(|| Arc::new(ExponentialBackoff::default())),
            processor: self.processor.unwrap_or_else(|| Arc::new(ResendUnchanged)),
            renderer: self.renderer,
            config: self.config,
        }
    }
}

impl ParallelEngine {
    pub fn builder(invoker: Arc<dyn Invoker>) -> ParallelEngineBuilder {
        ParallelEngineBuilder::new(invoker)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn rate_limiter(&self) -> &Arc<SlidingWindowLimiter> {
        &self.limiter
    }

    /// Run a batch to completion.
    pub async fn run(
        &self,
        tasks: Vec<Task>,
        concurrency_limit: usize,
    ) -> Result<BatchResult, ExecutorError> {
        self.spawn_with_limit(tasks, concurrency_limit)?.wait().await
    }

    /// Start a batch in the background using the configured concurrency.
    pub fn spawn(&self, tasks: Vec<Task>) -> Result<BatchRun, ExecutorError> {
        self.spawn_with_limit(tasks, self.config.concurrency_limit)
    }

    pub fn spawn_with_limit(
        &self,
        tasks: Vec<Task>,
        concurrency_limit: usize,
    ) -> Result<BatchRun, ExecutorError> {
        let run_id = Uuid::new_v4().to_string();
        let aggregator = Arc::new(ResultAggregator::new(
            run_id,
            tasks.iter().map(|t| t.id.clone()),
        )?);
        let cancel = CancelToken::new();

        let engine = self.clone();
        let handle = tokio::spawn({
            let aggregator = aggregator.clone();
            let cancel = cancel.clone();
            async move {
                engine
                    .drive(tasks, concurrency_limit, aggregator, cancel)
                    .await
            }
        });

        Ok(BatchRun {
            aggregator,
            cancel,
            handle,
        })
    }

    async fn drive(
        &self,
        tasks: Vec<Task>,
        concurrency_limit: usize,
        aggregator: Arc<ResultAggregator>,
        cancel: CancelToken,
    ) -> Result<BatchResult, ExecutorError> {
        let run_id = aggregator.run_id().to_string();
        let concurrency = concurrency_limit.max(1);

        tracing::info!(
            run_id = %run_id,
            total = tasks.len(),
            concurrency,
            rate_limit = self.limiter.limit(),
            window_secs = self.limiter.window().as_secs(),
            "batch run started"
        );
        self.emit(RenderEvent::RunStart {
            run_id: run_id.clone(),
            total_tasks: tasks.len(),
            concurrency,
        });

        let sem = Arc::new(Semaphore::new(concurrency));
        let mut futs: FuturesUnordered<_> = tasks
            .into_iter()
            .map(|task| self.dispatch_task(task, sem.clone(), &aggregator))
            .collect();

        let completed = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(run_id = %run_id, in_flight = aggregator.progress().in_flight, "batch run cancelled");
                    break false;
                }
                next = futs.next() => match next {
                    Some(res) => res?,
                    None => break true,
                },
            }
        };
        // Abandon whatever is still in flight after a cancel.
        drop(futs);
        if !completed {
            let released = aggregator.release_in_flight();
            tracing::debug!(run_id = %run_id, released, "abandoned dispatches returned to pending");
        }

        let result = aggregator.finalize(completed);
        tracing::info!(
            run_id = %run_id,
            succeeded = result.succeeded,
            failed = result.failed,
            completed = result.completed,
            input_tokens = result.usage.input_tokens,
            output_tokens = result.usage.output_tokens,
            duration_ms = result.duration_ms,
            "batch run finished: {}",
            result.summary()
        );
        self.emit(RenderEvent::RunEnd {
            run_id,
            total_tasks: result.total,
            succeeded: result.succeeded,
            failed: result.failed,
            completed: result.completed,
            usage: result.usage,
            duration_ms: result.duration_ms,
        });

        Ok(result)
    }

    /// Drive one task through dispatch and retries until it is terminal.
    async fn dispatch_task(
        &self,
        task: Task,
        sem: Arc<Semaphore>,
        aggregator: &ResultAggregator,
    ) -> Result<(), ExecutorError> {
        let run_id = aggregator.run_id();
        let mut payload: Value = task.payload.clone();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ExecutorError::Internal("semaphore closed unexpectedly".into()))?;
            self.limiter.acquire().await;

            aggregator.mark_in_flight(&task.id)?;
            tracing::debug!(task_id = %task.id, attempt, "dispatching task");
            self.emit(RenderEvent::TaskDispatch {
                run_id: run_id.to_string(),
                task_id: task.id.clone(),
                attempt,
            });

            let outcome = self.invoke_once(&task, &payload, attempt).await;
            drop(permit);

            let failure = match outcome {
                Ok(response) => {
                    aggregator.record(&task.id, Outcome::from(response), attempt)?;
                    self.emit_complete(run_id, &task.id, aggregator);
                    return Ok(());
                }
                Err(failure) => failure,
            };

            let delay = match self.retry_strategy.decide(failure.kind, attempt) {
                RetryDecision::Retry { delay } => delay,
                RetryDecision::GiveUp => {
                    tracing::warn!(
                        task_id = %task.id,
                        attempt,
                        kind = %failure.kind,
                        "task failed permanently: {}",
                        failure.message
                    );
                    aggregator.record(&task.id, Outcome::from(failure), attempt)?;
                    self.emit_complete(run_id, &task.id, aggregator);
                    return Ok(());
                }
            };

            aggregator.mark_pending(&task.id)?;
            tracing::warn!(
                task_id = %task.id,
                attempt,
                kind = %failure.kind,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "dispatch failed, retrying: {}",
                failure.message
            );
            self.emit(RenderEvent::TaskRetry {
                run_id: run_id.to_string(),
                task_id: task.id.clone(),
                attempt,
                kind: failure.kind,
                message: failure.message.clone(),
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });

            tokio::time::sleep(delay).await;

            let context = ProcessContext {
                run_id: run_id.to_string(),
                attempt: attempt + 1,
                current_payload: payload.clone(),
                last_failure: failure,
            };
            match self.processor.process(&task, &context).await {
                Ok(Some(rewritten)) => {
                    tracing::debug!(task_id = %task.id, processor = self.processor.name(), "payload rewritten for retry");
                    payload = rewritten;
                }
                Ok(None) => {}
                Err(e) => {
                    let failure = InvokeFailure::fatal(format!(
                        "payload processor `{}` failed: {e}",
                        self.processor.name()
                    ));
                    aggregator.record(&task.id, Outcome::from(failure), attempt)?;
                    self.emit_complete(run_id, &task.id, aggregator);
                    return Ok(());
                }
            }
        }
    }

    /// One invocation under the per-call timeout, followed by schema validation.
    async fn invoke_once(
        &self,
        task: &Task,
        payload: &Value,
        attempt: u32,
    ) -> Result<InvokeResponse, InvokeFailure> {
        let request = InvokeRequest {
            task_id: &task.id,
            payload,
            schema: task.schema.as_ref(),
            attempt,
        };

        let call = self.invoker.invoke(&request);
        let response = match self.config.per_call_timeout() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(res) => res,
                Err(_) => Err(InvokeFailure::transient(format!(
                    "call timed out after {}ms",
                    limit.as_millis()
                ))),
            },
            None => call.await,
        }?;

        if let Some(schema) = &task.schema {
            validate_result(schema, &response.result)?;
        }
        Ok(response)
    }

    fn emit(&self, event: RenderEvent) {
        if let Some(renderer) = &self.renderer {
            renderer.render(&event);
        }
    }

    fn emit_complete(&self, run_id: &str, task_id: &str, aggregator: &ResultAggregator) {
        if self.renderer.is_none() {
            return;
        }
        if let Some(entry) = aggregator.entry(task_id) {
            self.emit(RenderEvent::TaskComplete {
                run_id: run_id.to_string(),
                task_id: task_id.to_string(),
                entry,
            });
        }
    }
}

/// Handle to a batch running in the background.
pub struct BatchRun {
    aggregator: Arc<ResultAggregator>,
    cancel: CancelToken,
    handle: JoinHandle<Result<BatchResult, ExecutorError>>,
}

impl BatchRun {
    pub fn run_id(&self) -> &str {
        self.aggregator.run_id()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.aggregator.progress()
    }

    /// Shared view of the run's aggregator, for progress polling elsewhere.
    pub fn aggregator(&self) -> Arc<ResultAggregator> {
        self.aggregator.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the run; a cancelled run returns its partial result.
    pub async fn wait(self) -> Result<BatchResult, ExecutorError> {
        self.handle
            .await
            .map_err(|e| ExecutorError::Internal(format!("batch run task failed: {e}")))?
    }
}
