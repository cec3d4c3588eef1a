use crate::executor::types::{FailureKind, TaskEntry, Usage};

/// Lifecycle observer (controls how run events are printed).
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn render(&self, event: &RenderEvent);
}

#[derive(Debug, Clone)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        total_tasks: usize,
        concurrency: usize,
    },
    TaskDispatch {
        run_id: String,
        task_id: String,
        attempt: u32,
    },
    TaskRetry {
        run_id: String,
        task_id: String,
        attempt: u32,
        kind: FailureKind,
        message: String,
        delay_ms: u64,
    },
    TaskComplete {
        run_id: String,
        task_id: String,
        entry: TaskEntry,
    },
    RunEnd {
        run_id: String,
        total_tasks: usize,
        succeeded: usize,
        failed: usize,
        completed: bool,
        usage: Usage,
        duration_ms: u64,
    },
}
