use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of work: an input record turned into a remote request.
///
/// A task is immutable once built. The engine tracks attempts separately and
/// reports them on the final [`TaskEntry`](super::TaskEntry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Positional id of the source record (`"0"`, `"1"`, ...).
    pub id: String,

    /// Opaque request body handed to the invoker.
    pub payload: Value,

    /// Expected output shape, validated before a result is accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<FunctionDefinition>,
}

impl Task {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            schema: None,
        }
    }

    pub fn with_schema(mut self, schema: FunctionDefinition) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Build tasks keyed by position from an ordered list of payloads.
    pub fn from_payloads<I>(payloads: I) -> Vec<Task>
    where
        I: IntoIterator<Item = Value>,
    {
        payloads
            .into_iter()
            .enumerate()
            .map(|(idx, payload)| Task::new(idx.to_string(), payload))
            .collect()
    }
}

/// Strict function-calling definition describing the expected result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// JSON-schema object (`type`, `properties`, `required`, `additionalProperties`).
    #[serde(default = "default_parameters")]
    pub parameters: Value,
}

fn default_parameters() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}
