use async_trait::async_trait;
use serde_json::Value;
use skillbatch_core::api::{
    FailureKind, PayloadProcessorPlugin, ProcessContext, ProcessorError, Task,
};

const HINT_KEY: &str = "repair_hint";

/// Attaches a `repair_hint` to the payload before a malformed response is retried.
///
/// Transient retries resend the payload as it is (including any hint added by
/// an earlier malformed attempt).
pub struct RepairHintPlugin;

impl RepairHintPlugin {
    pub fn new() -> Self {
        Self
    }

    fn hint(task: &Task, context: &ProcessContext) -> String {
        let target = task
            .schema
            .as_ref()
            .map(|s| format!("the `{}` schema", s.name))
            .unwrap_or_else(|| "the requested format".to_string());
        format!(
            "Attempt {} of this request. The previous response was rejected: {}. \
             Reply with one JSON object that matches {} exactly.",
            context.attempt, context.last_failure.message, target
        )
    }
}

impl Default for RepairHintPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PayloadProcessorPlugin for RepairHintPlugin {
    fn name(&self) -> &str {
        "repair-hint"
    }

    async fn process(
        &self,
        task: &Task,
        context: &ProcessContext,
    ) -> Result<Option<Value>, ProcessorError> {
        if context.last_failure.kind != FailureKind::Malformed {
            return Ok(None);
        }

        let Value::Object(mut map) = context.current_payload.clone() else {
            tracing::debug!(task_id = %task.id, "payload is not an object; resending unchanged");
            return Ok(None);
        };
        map.insert(HINT_KEY.to_string(), Value::String(Self::hint(task, context)));
        Ok(Some(Value::Object(map)))
    }
}
