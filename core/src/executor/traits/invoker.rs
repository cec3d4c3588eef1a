use async_trait::async_trait;
use serde_json::Value;

use crate::executor::types::{FunctionDefinition, InvokeFailure, InvokeResponse};

/// One remote call as seen by an invoker.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRequest<'a> {
    pub task_id: &'a str,
    pub payload: &'a Value,
    pub schema: Option<&'a FunctionDefinition>,
    /// 1-based dispatch number for this task.
    pub attempt: u32,
}

/// Remote-call capability injected into the engine.
///
/// Implementations are shared across every concurrent dispatch, so they must
/// not keep per-call mutable state. The engine never looks at the transport;
/// it only reacts to the [`FailureKind`](crate::executor::types::FailureKind)
/// of a returned failure.
#[async_trait]
pub trait Invoker: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, request: &InvokeRequest<'_>) -> Result<InvokeResponse, InvokeFailure>;
}
