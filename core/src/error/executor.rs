use thiserror::Error;

/// Errors that abort a whole batch run.
///
/// Per-task failures never surface here; they are recorded on the task's
/// entry in the [`BatchResult`](crate::executor::BatchResult).
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Duplicate task ID: {0}")]
    DuplicateTaskId(String),

    #[error("Unknown task ID: {0}")]
    UnknownTask(String),

    #[error("Engine invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Internal executor error: {0}")]
    Internal(String),
}
