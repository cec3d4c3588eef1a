use thiserror::Error;

/// Shared executor error type.
pub type ExecutorError = crate::error::ExecutorError;

/// Errors raised by payload processors.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("processor error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}
