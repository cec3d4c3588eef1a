use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use super::config::PricingConfig;
use super::outcome::{FailureKind, Usage};

/// Final state of one task in a finished (or cancelled) batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskEntry {
    Succeeded {
        result: Value,
        usage: Usage,
        attempts: u32,
    },
    Failed {
        kind: FailureKind,
        message: String,
        attempts: u32,
    },
}

impl TaskEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }

    /// The validated result, or `None` for a failure marker.
    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Succeeded { result, .. } => Some(result),
            Self::Failed { .. } => None,
        }
    }

    /// Output form: the result verbatim, or an `{"error": ...}` marker.
    pub fn to_output(&self) -> Value {
        match self {
            Self::Succeeded { result, .. } => result.clone(),
            Self::Failed {
                kind,
                message,
                attempts,
            } => json!({
                "error": {
                    "kind": kind,
                    "message": message,
                    "attempts": attempts,
                }
            }),
        }
    }
}

/// Counts of tasks per lifecycle state at one observation point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub pending: usize,
}

impl ProgressSnapshot {
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn is_done(&self) -> bool {
        self.finished() == self.total
    }
}

/// Result of running a batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub run_id: String,

    /// Wall-clock time the aggregator was created.
    pub started_at: DateTime<Utc>,

    pub total: usize,

    pub succeeded: usize,

    pub failed: usize,

    /// False when the run was cancelled before every task was terminal.
    pub completed: bool,

    /// Sum of usage over all successful tasks.
    pub usage: Usage,

    pub duration_ms: u64,

    /// Task id -> terminal entry.
    pub entries: BTreeMap<String, TaskEntry>,
}

impl BatchResult {
    pub fn get(&self, task_id: &str) -> Option<&TaskEntry> {
        self.entries.get(task_id)
    }

    /// Tasks that never reached a terminal state (only non-zero when cancelled).
    pub fn unfinished(&self) -> usize {
        self.total - self.entries.len()
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} succeeded, {} failed out of {}",
            self.succeeded, self.failed, self.total
        );
        if !self.completed {
            line.push_str(&format!(" (cancelled, {} unfinished)", self.unfinished()));
        }
        line
    }

    /// The id -> result mapping handed back to callers.
    pub fn results_json(&self) -> Value {
        let map: Map<String, Value> = self
            .entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.to_output()))
            .collect();
        Value::Object(map)
    }

    pub fn estimated_cost(&self, pricing: &PricingConfig) -> f64 {
        self.usage.estimate_cost(pricing)
    }
}

impl Usage {
    pub fn estimate_cost(&self, pricing: &PricingConfig) -> f64 {
        (self.input_tokens as f64 * pricing.input_per_million
            + self.output_tokens as f64 * pricing.output_per_million)
            / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> BatchResult {
        let mut entries = BTreeMap::new();
        entries.insert(
            "0".to_string(),
            TaskEntry::Succeeded {
                result: json!({"label": "A"}),
                usage: Usage::new(100, 20),
                attempts: 1,
            },
        );
        entries.insert(
            "1".to_string(),
            TaskEntry::Failed {
                kind: FailureKind::Fatal,
                message: "unauthorized".to_string(),
                attempts: 1,
            },
        );
        BatchResult {
            run_id: "run".to_string(),
            started_at: Utc::now(),
            total: 3,
            succeeded: 1,
            failed: 1,
            completed: false,
            usage: Usage::new(100, 20),
            duration_ms: 5,
            entries,
        }
    }

    #[test]
    fn results_json_uses_failure_markers() {
        let out = sample().results_json();
        assert_eq!(
            out,
            json!({
                "0": {"label": "A"},
                "1": {"error": {"kind": "fatal", "message": "unauthorized", "attempts": 1}},
            })
        );
    }

    #[test]
    fn summary_mentions_cancellation() {
        assert_eq!(
            sample().summary(),
            "1 succeeded, 1 failed out of 3 (cancelled, 1 unfinished)"
        );
    }

    #[test]
    fn cost_estimate_uses_per_million_prices() {
        let pricing = PricingConfig {
            input_per_million: 2.0,
            output_per_million: 10.0,
        };
        let cost = Usage::new(500_000, 100_000).estimate_cost(&pricing);
        assert!((cost - 2.0).abs() < 1e-9);
    }
}
