use async_trait::async_trait;
use skillbatch_core::api::{InvokeFailure, InvokeRequest, InvokeResponse, Invoker, Usage};

/// Offline invoker: answers with the payload's `input` (or the whole payload)
/// and zero usage. Backs `--dry-run`.
pub struct EchoInvoker;

impl EchoInvoker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EchoInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Invoker for EchoInvoker {
    fn name(&self) -> &str {
        "echo"
    }

    async fn invoke(&self, request: &InvokeRequest<'_>) -> Result<InvokeResponse, InvokeFailure> {
        let result = request
            .payload
            .get("input")
            .cloned()
            .unwrap_or_else(|| request.payload.clone());
        tracing::debug!(task_id = %request.task_id, attempt = request.attempt, "echo");
        Ok(InvokeResponse {
            result,
            usage: Usage::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_returns_input() {
        let payload = json!({"instructions": "x", "input": {"id": 4}});
        let resp = EchoInvoker::new()
            .invoke(&InvokeRequest {
                task_id: "4",
                payload: &payload,
                schema: None,
                attempt: 1,
            })
            .await
            .unwrap();
        assert_eq!(resp.result, json!({"id": 4}));
        assert_eq!(resp.usage, Usage::default());
    }

    #[tokio::test]
    async fn test_echo_without_input_returns_payload() {
        let payload = json!({"text": "hi"});
        let resp = EchoInvoker::new()
            .invoke(&InvokeRequest {
                task_id: "0",
                payload: &payload,
                schema: None,
                attempt: 1,
            })
            .await
            .unwrap();
        assert_eq!(resp.result, payload);
    }
}
