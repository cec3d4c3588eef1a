use async_trait::async_trait;
use serde_json::Value;

use crate::executor::types::{InvokeFailure, ProcessorError, Task};

/// Hook that may rewrite a task payload before it is redispatched.
///
/// The engine consults it before every retry. Returning `Ok(None)` resends the
/// current payload unchanged.
#[async_trait]
pub trait PayloadProcessorPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn process(
        &self,
        task: &Task,
        context: &ProcessContext,
    ) -> Result<Option<Value>, ProcessorError>;
}

/// Retry context passed to a payload processor.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    pub run_id: String,
    /// Dispatch number about to be made.
    pub attempt: u32,
    /// Payload used by the previous dispatch.
    pub current_payload: Value,
    pub last_failure: InvokeFailure,
}

/// Default hook: resend unchanged.
pub struct ResendUnchanged;

#[async_trait]
impl PayloadProcessorPlugin for ResendUnchanged {
    fn name(&self) -> &str {
        "resend-unchanged"
    }

    async fn process(
        &self,
        _task: &Task,
        _context: &ProcessContext,
    ) -> Result<Option<Value>, ProcessorError> {
        Ok(None)
    }
}
