use skillbatch_core::api::{OutputRendererPlugin, RenderEvent, TaskEntry};

/// Human-readable event lines on stderr.
pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                total_tasks,
                concurrency,
            } => format!(
                "RUN START {} (tasks: {}, concurrency: {})",
                run_id, total_tasks, concurrency
            ),
            RenderEvent::TaskDispatch {
                run_id,
                task_id,
                attempt,
            } => format!("TASK DISPATCH {} (task {}, attempt {})", run_id, task_id, attempt),
            RenderEvent::TaskRetry {
                run_id,
                task_id,
                attempt,
                kind,
                message,
                delay_ms,
            } => format!(
                "TASK RETRY {} (task {}, attempt {}, {} in {}ms): {}",
                run_id, task_id, attempt, kind, delay_ms, message
            ),
            RenderEvent::TaskComplete {
                run_id,
                task_id,
                entry,
            } => {
                let status = match (entry.is_success(), self.ascii_only) {
                    (true, true) => "OK",
                    (true, false) => "✓ SUCCESS",
                    (false, true) => "FAIL",
                    (false, false) => "✗ FAILED",
                };
                let mut line = format!(
                    "TASK END {} (task {}, status {}, attempts {})",
                    run_id,
                    task_id,
                    status,
                    entry.attempts()
                );
                if let TaskEntry::Failed { kind, message, .. } = entry {
                    line.push_str(&format!(": {} {}", kind, message));
                }
                line
            }
            RenderEvent::RunEnd {
                run_id,
                total_tasks,
                succeeded,
                failed,
                completed,
                usage,
                duration_ms,
            } => {
                let mut line = format!(
                    "RUN END {} (succeeded {}, failed {}, total {}, tokens {}/{}, duration {}ms)",
                    run_id,
                    succeeded,
                    failed,
                    total_tasks,
                    usage.input_tokens,
                    usage.output_tokens,
                    duration_ms
                );
                if !completed {
                    line.push_str(" [cancelled]");
                }
                line
            }
        }
    }
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        eprintln!("{}", self.format_event(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use skillbatch_core::api::{FailureKind, Usage};

    #[test]
    fn test_text_renderer_task_complete() {
        let renderer = TextRendererPlugin::new(true);
        let event = RenderEvent::TaskComplete {
            run_id: "run".to_string(),
            task_id: "task".to_string(),
            entry: TaskEntry::Failed {
                kind: FailureKind::Malformed,
                message: "not JSON".to_string(),
                attempts: 3,
            },
        };

        let line = renderer.format_event(&event);
        assert!(line.contains("TASK END"));
        assert!(line.contains("status FAIL"));
        assert!(line.contains("attempts 3"));
        assert!(line.ends_with("malformed not JSON"));
    }

    #[test]
    fn test_text_renderer_success_and_cancelled_run() {
        let renderer = TextRendererPlugin::new(false);
        let ok = renderer.format_event(&RenderEvent::TaskComplete {
            run_id: "run".to_string(),
            task_id: "0".to_string(),
            entry: TaskEntry::Succeeded {
                result: json!({}),
                usage: Usage::default(),
                attempts: 1,
            },
        });
        assert!(ok.contains("SUCCESS"));

        let end = renderer.format_event(&RenderEvent::RunEnd {
            run_id: "run".to_string(),
            total_tasks: 5,
            succeeded: 2,
            failed: 0,
            completed: false,
            usage: Usage::new(1, 2),
            duration_ms: 9,
        });
        assert!(end.ends_with("[cancelled]"));
    }
}
