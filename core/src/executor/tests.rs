use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tokio::time::Instant;

use crate::error::ExecutorError;

use super::traits::{InvokeRequest, Invoker, PayloadProcessorPlugin, ProcessContext};
use super::types::{
    EngineConfig, FailureKind, FunctionDefinition, InvokeFailure, InvokeResponse, ProcessorError,
    RetryConfig, Task, TaskEntry, Usage,
};
use super::{ExponentialBackoff, ParallelEngine, SlidingWindowLimiter};

#[derive(Clone)]
enum Step {
    Ok(Value),
    Fail(InvokeFailure),
    Hang,
    Sleep(Duration),
}

/// Invoker replaying a per-task script, echoing the payload once it runs out.
#[derive(Default)]
struct ScriptedInvoker {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    always: HashMap<String, Step>,
    calls: Mutex<HashMap<String, Vec<Value>>>,
    starts: Mutex<Vec<Instant>>,
    call_delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedInvoker {
    fn new() -> Self {
        Self::default()
    }

    fn script(self, id: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), steps.into());
        self
    }

    fn always(mut self, id: &str, step: Step) -> Self {
        self.always.insert(id.to_string(), step);
        self
    }

    fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    fn calls(&self, id: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    fn attempts(&self, id: &str) -> usize {
        self.calls(id).len()
    }

    fn next_step(&self, id: &str) -> Option<Step> {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front);
        scripted.or_else(|| self.always.get(id).cloned())
    }
}

#[async_trait]
impl Invoker for ScriptedInvoker {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, request: &InvokeRequest<'_>) -> Result<InvokeResponse, InvokeFailure> {
        self.calls
            .lock()
            .unwrap()
            .entry(request.task_id.to_string())
            .or_default()
            .push(request.payload.clone());
        self.starts.lock().unwrap().push(Instant::now());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }

        let reply = match self.next_step(request.task_id) {
            Some(Step::Ok(result)) => Ok(InvokeResponse::new(result, Usage::new(10, 5))),
            Some(Step::Fail(failure)) => Err(failure),
            Some(Step::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            Some(Step::Sleep(d)) => {
                tokio::time::sleep(d).await;
                Ok(InvokeResponse::new(json!({"slept": true}), Usage::default()))
            }
            None => Ok(InvokeResponse::new(
                json!({ "echo": request.payload }),
                Usage::new(10, 5),
            )),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

fn retry_config(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        base_delay_ms: 100,
        max_delay_ms: 1_000,
        max_attempts,
        jitter: false,
        ..RetryConfig::default()
    }
}

fn engine(invoker: Arc<ScriptedInvoker>, config: EngineConfig) -> ParallelEngine {
    ParallelEngine::builder(invoker)
        .config(config)
        .retry_strategy(Arc::new(ExponentialBackoff::new(&retry_config(3))))
        .build()
}

fn tasks(n: usize) -> Vec<Task> {
    Task::from_payloads((0..n).map(|i| json!({ "record": i })))
}

#[tokio::test(start_paused = true)]
async fn empty_batch_returns_empty_mapping() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let result = engine(invoker, EngineConfig::default())
        .run(Vec::new(), 4)
        .await
        .unwrap();

    assert!(result.entries.is_empty());
    assert_eq!(result.total, 0);
    assert!(result.completed);
    assert_eq!(result.summary(), "0 succeeded, 0 failed out of 0");
}

#[tokio::test(start_paused = true)]
async fn every_task_gets_exactly_one_entry_with_verbatim_payload() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let batch = tasks(50);
    let result = engine(invoker.clone(), EngineConfig::default())
        .run(batch.clone(), 8)
        .await
        .unwrap();

    assert_eq!(result.entries.len(), 50);
    assert_eq!(result.succeeded, 50);
    assert_eq!(result.usage, Usage::new(500, 250));
    for task in &batch {
        let entry = result.get(&task.id).expect("entry per task");
        assert_eq!(entry.result(), Some(&json!({ "echo": task.payload })));
        assert_eq!(entry.attempts(), 1);
        assert_eq!(invoker.attempts(&task.id), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn fatal_failure_is_terminal_after_one_attempt() {
    let invoker =
        Arc::new(ScriptedInvoker::new().always("0", Step::Fail(InvokeFailure::fatal("401"))));
    let result = engine(invoker.clone(), EngineConfig::default())
        .run(tasks(1), 1)
        .await
        .unwrap();

    assert_eq!(invoker.attempts("0"), 1);
    assert_eq!(
        result.get("0"),
        Some(&TaskEntry::Failed {
            kind: FailureKind::Fatal,
            message: "401".to_string(),
            attempts: 1,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn transient_failures_below_budget_end_in_success() {
    for k in 0..3usize {
        let steps = vec![Step::Fail(InvokeFailure::transient("503")); k];
        let invoker = Arc::new(
            ScriptedInvoker::new()
                .script("0", steps)
                .always("0", Step::Ok(json!({"label": "ok"}))),
        );
        let result = engine(invoker.clone(), EngineConfig::default())
            .run(tasks(1), 1)
            .await
            .unwrap();

        let entry = result.get("0").unwrap();
        assert_eq!(entry.result(), Some(&json!({"label": "ok"})));
        assert_eq!(entry.attempts() as usize, k + 1);
        assert_eq!(invoker.attempts("0"), k + 1);
    }
}

#[tokio::test(start_paused = true)]
async fn persistent_transient_failure_exhausts_max_attempts() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .script(
                "0",
                vec![
                    Step::Fail(InvokeFailure::transient("connection reset")),
                    Step::Fail(InvokeFailure::transient("connection reset")),
                ],
            )
            .always("0", Step::Fail(InvokeFailure::transient("HTTP 503"))),
    );
    let started = Instant::now();
    let result = engine(invoker.clone(), EngineConfig::default())
        .run(tasks(1), 1)
        .await
        .unwrap();

    assert_eq!(invoker.attempts("0"), 3);
    let entry = result.get("0").unwrap();
    assert!(!entry.is_success());
    assert_eq!(entry.attempts(), 3);
    assert_eq!(
        entry,
        &TaskEntry::Failed {
            kind: FailureKind::Transient,
            message: "HTTP 503".to_string(),
            attempts: 3,
        }
    );
    assert_eq!(result.failed, 1);
    // Backoff of 100ms then 200ms between the three attempts.
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn one_permanent_failure_does_not_affect_other_tasks() {
    let batch = tasks(20);
    let baseline = engine(Arc::new(ScriptedInvoker::new()), EngineConfig::default())
        .run(batch.clone(), 4)
        .await
        .unwrap();

    let invoker =
        Arc::new(ScriptedInvoker::new().always("7", Step::Fail(InvokeFailure::fatal("bad record"))));
    let result = engine(invoker, EngineConfig::default())
        .run(batch, 4)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 19);
    assert_eq!(result.failed, 1);
    for (id, entry) in &result.entries {
        if id == "7" {
            assert!(!entry.is_success());
        } else {
            assert_eq!(entry, baseline.get(id).unwrap());
        }
    }
}

#[tokio::test(start_paused = true)]
async fn mixed_batch_scenario() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .always("0", Step::Ok(json!("A")))
            .script("1", vec![Step::Fail(InvokeFailure::transient("timeout"))])
            .always("1", Step::Ok(json!("B")))
            .always("2", Step::Fail(InvokeFailure::fatal("forbidden"))),
    );
    let result = engine(invoker, EngineConfig::default())
        .run(tasks(3), 3)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 1);
    assert!(result.completed);
    assert_eq!(
        result.results_json(),
        json!({
            "0": "A",
            "1": "B",
            "2": {"error": {"kind": "fatal", "message": "forbidden", "attempts": 1}},
        })
    );
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_partial_result() {
    let mut invoker = ScriptedInvoker::new();
    for id in ["2", "3", "4"] {
        invoker = invoker.always(id, Step::Hang);
    }
    let invoker = Arc::new(invoker);
    let run = engine(invoker, EngineConfig::default())
        .spawn_with_limit(tasks(5), 5)
        .unwrap();

    while run.progress().succeeded < 2 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let progress = run.progress();
    assert_eq!(progress.in_flight, 3);
    assert_eq!(
        progress.pending + progress.in_flight + progress.succeeded + progress.failed,
        5
    );

    run.cancel();
    let result = run.wait().await.unwrap();

    assert!(!result.completed);
    assert_eq!(result.total, 5);
    assert!(result.get("0").unwrap().is_success());
    assert!(result.get("1").unwrap().is_success());
    assert_eq!(result.unfinished(), 3);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_reports_no_dispatch_in_flight() {
    let invoker = Arc::new(ScriptedInvoker::new().always("1", Step::Hang));
    let run = engine(invoker, EngineConfig::default())
        .spawn_with_limit(tasks(2), 2)
        .unwrap();
    let aggregator = run.aggregator();

    while run.progress().succeeded < 1 || run.progress().in_flight < 1 {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    run.cancel();
    let result = run.wait().await.unwrap();

    assert!(!result.completed);
    let progress = aggregator.progress();
    assert_eq!(progress.in_flight, 0);
    assert_eq!(progress.pending, 1);
    assert_eq!(progress.succeeded, 1);
}

#[tokio::test(start_paused = true)]
async fn per_call_timeout_is_a_retried_transient_failure() {
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .script("0", vec![Step::Hang])
            .always("0", Step::Ok(json!({"late": false}))),
    );
    let config = EngineConfig {
        per_call_timeout_ms: Some(1_000),
        ..EngineConfig::default()
    };
    let result = engine(invoker.clone(), config)
        .run(tasks(1), 1)
        .await
        .unwrap();

    assert_eq!(invoker.attempts("0"), 2);
    assert_eq!(result.get("0").unwrap().result(), Some(&json!({"late": false})));
}

struct TagRepair;

#[async_trait]
impl PayloadProcessorPlugin for TagRepair {
    fn name(&self) -> &str {
        "tag-repair"
    }

    async fn process(
        &self,
        _task: &Task,
        context: &ProcessContext,
    ) -> Result<Option<Value>, ProcessorError> {
        if context.last_failure.kind != FailureKind::Malformed {
            return Ok(None);
        }
        let mut payload = context.current_payload.clone();
        payload["repair"] = json!(context.attempt);
        Ok(Some(payload))
    }
}

#[tokio::test(start_paused = true)]
async fn schema_violation_is_malformed_and_repaired_on_retry() {
    let schema = FunctionDefinition {
        name: "label".to_string(),
        description: String::new(),
        parameters: json!({
            "type": "object",
            "properties": {"label": {"type": "string"}},
            "required": ["label"],
            "additionalProperties": false
        }),
    };
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .script("0", vec![Step::Ok(json!({"lable": "typo"}))])
            .always("0", Step::Ok(json!({"label": "fixed"}))),
    );
    let engine = ParallelEngine::builder(invoker.clone())
        .retry_strategy(Arc::new(ExponentialBackoff::new(&retry_config(3))))
        .processor(Arc::new(TagRepair))
        .build();

    let task = Task::new("0", json!({"text": "hello"})).with_schema(schema);
    let result = engine.run(vec![task], 1).await.unwrap();

    assert_eq!(result.get("0").unwrap().result(), Some(&json!({"label": "fixed"})));
    assert_eq!(
        invoker.calls("0"),
        vec![json!({"text": "hello"}), json!({"text": "hello", "repair": 2})]
    );
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_bounds_in_flight_dispatches() {
    let invoker = Arc::new(ScriptedInvoker::new().with_call_delay(Duration::from_millis(50)));
    let result = engine(invoker.clone(), EngineConfig::default())
        .run(tasks(40), 6)
        .await
        .unwrap();

    assert_eq!(result.succeeded, 40);
    let max = invoker.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 6, "saw {max} concurrent dispatches");
    assert!(max >= 2);
}

#[tokio::test(start_paused = true)]
async fn dispatch_starts_respect_shared_rate_limiter() {
    let window = Duration::from_secs(10);
    let limiter = Arc::new(SlidingWindowLimiter::new(5, window));
    let invoker = Arc::new(ScriptedInvoker::new());
    let engine = ParallelEngine::builder(invoker.clone())
        .rate_limiter(limiter)
        .build();

    let result = engine.run(tasks(12), 12).await.unwrap();
    assert_eq!(result.succeeded, 12);

    let starts = invoker.starts.lock().unwrap().clone();
    for s in &starts {
        let in_window = starts.iter().filter(|t| **t >= *s && **t < *s + window).count();
        assert!(in_window <= 5);
    }
}

#[tokio::test(start_paused = true)]
async fn retry_waits_for_a_fresh_rate_limit_grant() {
    let window = Duration::from_secs(10);
    let limiter = Arc::new(SlidingWindowLimiter::new(1, window));
    let invoker = Arc::new(
        ScriptedInvoker::new()
            .script("0", vec![Step::Fail(InvokeFailure::transient("HTTP 429"))])
            .always("0", Step::Ok(json!({"label": "ok"}))),
    );
    let engine = ParallelEngine::builder(invoker.clone())
        .rate_limiter(limiter)
        .retry_strategy(Arc::new(ExponentialBackoff::new(&retry_config(3))))
        .build();

    let result = engine.run(tasks(1), 1).await.unwrap();
    assert_eq!(result.get("0").unwrap().attempts(), 2);

    let starts = invoker.starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 2);
    let gap = starts[1] - starts[0];
    // The 100ms backoff ends long before the first grant ages out.
    assert!(gap >= window, "redispatched after {gap:?}");
    assert!(gap < window + Duration::from_millis(100));
}

#[tokio::test]
async fn duplicate_task_ids_are_rejected() {
    let invoker = Arc::new(ScriptedInvoker::new());
    let batch = vec![Task::new("0", json!(1)), Task::new("0", json!(2))];
    let err = engine(invoker, EngineConfig::default())
        .run(batch, 2)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutorError::DuplicateTaskId(id) if id == "0"));
}
