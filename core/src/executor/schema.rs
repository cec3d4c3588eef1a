//! Structural validation of results against a function definition.
//!
//! Supports the subset of JSON schema that strict function calling uses:
//! `type` (single or list), `properties`, `required`, `additionalProperties`,
//! `items` and `enum`. Unknown keywords are ignored.

use serde_json::{Map, Value};

use super::types::{FunctionDefinition, InvokeFailure};

/// Check `result` against the definition's `parameters`, reporting the first
/// violation as a `Malformed` failure.
pub fn validate_result(
    definition: &FunctionDefinition,
    result: &Value,
) -> Result<(), InvokeFailure> {
    check(&definition.parameters, result, "$").map_err(|msg| {
        InvokeFailure::malformed(format!(
            "result does not match schema `{}`: {msg}",
            definition.name
        ))
    })
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type") {
        let matches = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !matches {
            return Err(format!(
                "{path}: expected type {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} not in enum"));
        }
    }

    match value {
        Value::Object(obj) => check_object(schema, obj, path),
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (idx, item) in items.iter().enumerate() {
                    check(item_schema, item, &format!("{path}[{idx}]"))?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn check_object(schema: &Map<String, Value>, obj: &Map<String, Value>, path: &str) -> Result<(), String> {
    let properties = schema.get("properties").and_then(Value::as_object);

    if let Some(Value::Array(required)) = schema.get("required") {
        for name in required.iter().filter_map(Value::as_str) {
            if !obj.contains_key(name) {
                return Err(format!("{path}: missing required field `{name}`"));
            }
        }
    }

    let closed = matches!(schema.get("additionalProperties"), Some(Value::Bool(false)));
    for (key, field) in obj {
        match properties.and_then(|p| p.get(key)) {
            Some(field_schema) => check(field_schema, field, &format!("{path}.{key}"))?,
            None if closed => return Err(format!("{path}: unexpected field `{key}`")),
            None => {}
        }
    }
    Ok(())
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
