use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::error::ExecutorError;

use super::types::{BatchResult, Outcome, ProgressSnapshot, TaskEntry, Usage};

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Pending,
    InFlight,
    Done(TaskEntry),
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<String, Slot>,
    succeeded: usize,
    failed: usize,
    in_flight: usize,
    usage: Usage,
}

/// Owns the id -> terminal entry mapping of one run.
///
/// Every task starts `Pending`. The engine moves it to `InFlight` for the
/// duration of each dispatch and back to `Pending` while it waits for a retry;
/// `record` makes it terminal. All transitions happen under one lock, so a
/// snapshot always satisfies `pending + in_flight + succeeded + failed == total`.
#[derive(Debug)]
pub struct ResultAggregator {
    run_id: String,
    total: usize,
    started: Instant,
    started_at: DateTime<Utc>,
    inner: Mutex<Inner>,
}

impl ResultAggregator {
    pub fn new<I, S>(run_id: impl Into<String>, task_ids: I) -> Result<Self, ExecutorError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slots = HashMap::new();
        for id in task_ids {
            let id = id.into();
            if slots.insert(id.clone(), Slot::Pending).is_some() {
                return Err(ExecutorError::DuplicateTaskId(id));
            }
        }

        Ok(Self {
            run_id: run_id.into(),
            total: slots.len(),
            started: Instant::now(),
            started_at: Utc::now(),
            inner: Mutex::new(Inner {
                slots,
                ..Inner::default()
            }),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn mark_in_flight(&self, task_id: &str) -> Result<(), ExecutorError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.slots.get_mut(task_id) {
            Some(slot @ Slot::Pending) => {
                *slot = Slot::InFlight;
                inner.in_flight += 1;
                Ok(())
            }
            Some(other) => Err(ExecutorError::InvariantViolation(format!(
                "task {task_id} dispatched from state {other:?}"
            ))),
            None => Err(ExecutorError::UnknownTask(task_id.to_string())),
        }
    }

    /// Return an in-flight task to `Pending` (awaiting retry).
    pub fn mark_pending(&self, task_id: &str) -> Result<(), ExecutorError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.slots.get_mut(task_id) {
            Some(slot @ Slot::InFlight) => {
                *slot = Slot::Pending;
                inner.in_flight -= 1;
                Ok(())
            }
            Some(other) => Err(ExecutorError::InvariantViolation(format!(
                "task {task_id} parked from state {other:?}"
            ))),
            None => Err(ExecutorError::UnknownTask(task_id.to_string())),
        }
    }

    /// Return every in-flight task to `Pending` after its dispatch was abandoned.
    pub fn release_in_flight(&self) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let mut released = 0;
        for slot in inner.slots.values_mut() {
            if matches!(slot, Slot::InFlight) {
                *slot = Slot::Pending;
                released += 1;
            }
        }
        inner.in_flight -= released;
        released
    }

    /// Record the terminal outcome of a task.
    ///
    /// Re-recording an identical entry is a no-op. A differing entry over a
    /// terminal Success is an invariant violation; over a terminal failure it
    /// is ignored and the first entry kept.
    pub fn record(
        &self,
        task_id: &str,
        outcome: Outcome,
        attempts: u32,
    ) -> Result<(), ExecutorError> {
        let entry = match outcome {
            Outcome::Success { result, usage } => TaskEntry::Succeeded {
                result,
                usage,
                attempts,
            },
            Outcome::Failure { kind, message, .. } => TaskEntry::Failed {
                kind,
                message,
                attempts,
            },
        };

        let mut guard = self.lock();
        let inner = &mut *guard;
        let slot = inner
            .slots
            .get_mut(task_id)
            .ok_or_else(|| ExecutorError::UnknownTask(task_id.to_string()))?;

        match slot {
            Slot::Done(existing) if *existing == entry => return Ok(()),
            Slot::Done(existing) if existing.is_success() => {
                return Err(ExecutorError::InvariantViolation(format!(
                    "attempt to overwrite terminal success of task {task_id}"
                )));
            }
            Slot::Done(_) => {
                tracing::warn!(task_id, "ignoring second terminal record for failed task");
                return Ok(());
            }
            Slot::InFlight => inner.in_flight -= 1,
            Slot::Pending => {}
        }

        match &entry {
            TaskEntry::Succeeded { usage, .. } => {
                inner.succeeded += 1;
                inner.usage += *usage;
            }
            TaskEntry::Failed { .. } => inner.failed += 1,
        }
        *slot = Slot::Done(entry);
        Ok(())
    }

    pub fn progress(&self) -> ProgressSnapshot {
        let inner = self.lock();
        ProgressSnapshot {
            total: self.total,
            succeeded: inner.succeeded,
            failed: inner.failed,
            in_flight: inner.in_flight,
            pending: self.total - inner.succeeded - inner.failed - inner.in_flight,
        }
    }

    /// Terminal entry of a task, if it has one yet.
    pub fn entry(&self, task_id: &str) -> Option<TaskEntry> {
        match self.lock().slots.get(task_id) {
            Some(Slot::Done(entry)) => Some(entry.clone()),
            _ => None,
        }
    }

    pub fn usage(&self) -> Usage {
        self.lock().usage
    }

    /// Snapshot the terminal entries into a [`BatchResult`].
    pub fn finalize(&self, completed: bool) -> BatchResult {
        let inner = self.lock();
        let entries: BTreeMap<String, TaskEntry> = inner
            .slots
            .iter()
            .filter_map(|(id, slot)| match slot {
                Slot::Done(entry) => Some((id.clone(), entry.clone())),
                _ => None,
            })
            .collect();

        BatchResult {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            total: self.total,
            succeeded: inner.succeeded,
            failed: inner.failed,
            completed: completed && entries.len() == self.total,
            usage: inner.usage,
            duration_ms: u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX),
            entries,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
