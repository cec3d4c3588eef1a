//! Skill files and input records.
//!
//! A skill is a JSON document:
//!
//! ```json
//! {
//!   "name": "classify",
//!   "instructions": "Label the ticket as bug, feature or question.",
//!   "function_definition": {
//!     "name": "classify",
//!     "parameters": {"type": "object", "properties": {"label": {"type": "string"}}}
//!   }
//! }
//! ```
//!
//! Records are read from a JSON array or from JSON Lines.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use skillbatch_core::api::{FunctionDefinition, Task};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,

    pub instructions: String,

    /// Output schema; when present every result is validated against it.
    #[serde(default)]
    pub function_definition: Option<FunctionDefinition>,
}

pub fn load_skill(path: &Path) -> Result<Skill> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read skill file {}", path.display()))?;
    let skill: Skill = serde_json::from_str(&raw)
        .with_context(|| format!("invalid skill file {}", path.display()))?;
    if skill.instructions.trim().is_empty() {
        anyhow::bail!("skill `{}` has empty instructions", skill.name);
    }
    Ok(skill)
}

/// Reads input records: a top-level JSON array, or one JSON value per line.
pub fn read_records(path: &Path) -> Result<Vec<Value>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input file {}", path.display()))?;
    parse_records(&raw).with_context(|| format!("invalid input file {}", path.display()))
}

pub fn parse_records(raw: &str) -> Result<Vec<Value>> {
    let trimmed = raw.trim_start();
    if trimmed.starts_with('[') {
        if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
            return Ok(items);
        }
    }

    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str::<Value>(line)
                .with_context(|| format!("line {} is not valid JSON", idx + 1))
        })
        .collect()
}

/// One task per record, ids `"0".."n-1"` in input order.
pub fn build_tasks(skill: &Skill, records: Vec<Value>) -> Vec<Task> {
    records
        .into_iter()
        .enumerate()
        .map(|(idx, input)| {
            let payload = json!({
                "instructions": skill.instructions,
                "input": input,
                "skill": skill.name,
            });
            let task = Task::new(idx.to_string(), payload);
            match &skill.function_definition {
                Some(def) => task.with_schema(def.clone()),
                None => task,
            }
        })
        .collect()
}
