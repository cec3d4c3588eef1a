use chrono::Local;
use serde_json::{json, Value};
use skillbatch_core::api::{OutputRendererPlugin, RenderEvent};

/// One JSON object per lifecycle event, written to stderr.
pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        match event {
            RenderEvent::RunStart {
                run_id,
                total_tasks,
                concurrency,
            } => json!({
                "v": 1,
                "event_type": "run.start",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "total_tasks": total_tasks,
                    "concurrency": concurrency,
                }
            }),
            RenderEvent::TaskDispatch {
                run_id,
                task_id,
                attempt,
            } => json!({
                "v": 1,
                "event_type": "task.dispatch",
                "ts": ts,
                "run_id": run_id,
                "task_id": task_id,
                "metadata": {
                    "attempt": attempt,
                }
            }),
            RenderEvent::TaskRetry {
                run_id,
                task_id,
                attempt,
                kind,
                message,
                delay_ms,
            } => json!({
                "v": 1,
                "event_type": "task.retry",
                "ts": ts,
                "run_id": run_id,
                "task_id": task_id,
                "metadata": {
                    "attempt": attempt,
                    "kind": kind,
                    "message": message,
                    "delay_ms": delay_ms,
                }
            }),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                entry,
            } => json!({
                "v": 1,
                "event_type": "task.end",
                "ts": ts,
                "run_id": run_id,
                "task_id": task_id,
                "metadata": entry,
            }),
            RenderEvent::RunEnd {
                run_id,
                total_tasks,
                succeeded,
                failed,
                completed,
                usage,
                duration_ms,
            } => json!({
                "v": 1,
                "event_type": "run.end",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "total_tasks": total_tasks,
                    "succeeded": succeeded,
                    "failed": failed,
                    "completed": completed,
                    "usage": usage,
                    "duration_ms": duration_ms,
                }
            }),
        }
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            eprintln!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            eprintln!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}
