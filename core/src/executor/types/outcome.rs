use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Token counts reported by the remote endpoint for one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens = self.input_tokens.saturating_add(rhs.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(rhs.output_tokens);
    }
}

/// Three-way failure classification the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network errors, timeouts, remote rate limiting, 5xx.
    Transient,
    /// Response did not parse or failed schema validation.
    Malformed,
    /// Authentication, configuration or permanent 4xx errors.
    Fatal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Malformed => "malformed",
            Self::Fatal => "fatal",
        }
    }

    pub fn is_retriable(self) -> bool {
        !matches!(self, Self::Fatal)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified failure of a single invocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} failure: {message}")]
pub struct InvokeFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl InvokeFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transient, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Malformed, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Fatal, message)
    }
}

/// Structured response of a successful invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeResponse {
    pub result: Value,
    pub usage: Usage,
}

impl InvokeResponse {
    pub fn new(result: Value, usage: Usage) -> Self {
        Self { result, usage }
    }
}

/// Outcome of one dispatch, as handed to the aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success {
        result: Value,
        usage: Usage,
    },
    Failure {
        kind: FailureKind,
        message: String,
        retriable: bool,
    },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<InvokeResponse> for Outcome {
    fn from(resp: InvokeResponse) -> Self {
        Self::Success {
            result: resp.result,
            usage: resp.usage,
        }
    }
}

impl From<InvokeFailure> for Outcome {
    fn from(failure: InvokeFailure) -> Self {
        Self::Failure {
            retriable: failure.kind.is_retriable(),
            kind: failure.kind,
            message: failure.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total += Usage::new(10, 5);
        total += Usage::new(1, 2);
        assert_eq!(total, Usage::new(11, 7));
        assert_eq!(total.total(), 18);
    }

    #[test]
    fn failure_outcome_carries_retriable_flag() {
        let outcome: Outcome = InvokeFailure::fatal("bad key").into();
        match outcome {
            Outcome::Failure {
                kind, retriable, ..
            } => {
                assert_eq!(kind, FailureKind::Fatal);
                assert!(!retriable);
            }
            _ => panic!("expected failure"),
        }

        let outcome: Outcome = InvokeFailure::transient("503").into();
        assert!(matches!(outcome, Outcome::Failure { retriable: true, .. }));
    }

    #[test]
    fn failure_display_includes_kind() {
        let f = InvokeFailure::malformed("missing field `label`");
        assert_eq!(f.to_string(), "malformed failure: missing field `label`");
    }
}
