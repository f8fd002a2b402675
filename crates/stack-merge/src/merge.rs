//! Deep merge engine
//!
//! Merges an ordered sequence of configuration mappings left to right.
//! Later documents take precedence. Mappings merge recursively, lists per
//! the configured strategy, scalars replace. A null on either side always
//! loses to a concrete value: deferred-function placeholders are nulls at
//! merge time, and the type-conflict rule must not fire against them.

use crate::{Error, Result};
use serde_yaml::{Mapping, Value};
use stack_schema::ListMergeStrategy;

/// Merge documents in precedence order (later overrides earlier).
///
/// Inputs are never mutated; the result is a fresh tree sharing no
/// sub-maps with any input. Merging the same inputs twice produces an
/// identical result, including key ordering.
pub fn merge(strategy: ListMergeStrategy, inputs: &[Mapping]) -> Result<Mapping> {
    let mut result = Mapping::new();
    for input in inputs {
        result = merge_mappings(&result, input, strategy, &mut Vec::new())?;
    }
    Ok(result)
}

fn merge_mappings(
    existing: &Mapping,
    incoming: &Mapping,
    strategy: ListMergeStrategy,
    path: &mut Vec<String>,
) -> Result<Mapping> {
    let mut out = existing.clone();
    for (key, new_value) in incoming {
        let merged = match out.get(key) {
            Some(old_value) => {
                path.push(key_label(key));
                let merged = merge_values(old_value, new_value, strategy, path)?;
                path.pop();
                merged
            }
            None => new_value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    Ok(out)
}

/// Merge two values found at the same key path.
pub(crate) fn merge_values(
    existing: &Value,
    incoming: &Value,
    strategy: ListMergeStrategy,
    path: &mut Vec<String>,
) -> Result<Value> {
    match (existing, incoming) {
        // Placeholder exception: null never overrides and never conflicts.
        (Value::Null, other) => Ok(other.clone()),
        (other, Value::Null) => Ok(other.clone()),

        (Value::Mapping(old), Value::Mapping(new)) => {
            Ok(Value::Mapping(merge_mappings(old, new, strategy, path)?))
        }
        (Value::Sequence(old), Value::Sequence(new)) => {
            merge_sequences(old, new, strategy, path)
        }

        (old, new) if is_scalar(old) && is_scalar(new) => Ok(new.clone()),

        (old, new) => Err(Error::TypeConflict {
            path: path.join("."),
            existing: type_name(old),
            incoming: type_name(new),
        }),
    }
}

fn merge_sequences(
    existing: &[Value],
    incoming: &[Value],
    strategy: ListMergeStrategy,
    path: &mut Vec<String>,
) -> Result<Value> {
    match strategy {
        ListMergeStrategy::Replace => Ok(Value::Sequence(incoming.to_vec())),
        ListMergeStrategy::Append => {
            let mut out = existing.to_vec();
            out.extend(incoming.iter().cloned());
            Ok(Value::Sequence(out))
        }
        ListMergeStrategy::Merge => {
            let len = existing.len().max(incoming.len());
            let mut out = Vec::with_capacity(len);
            for i in 0..len {
                let merged = match (existing.get(i), incoming.get(i)) {
                    (Some(Value::Mapping(old)), Some(Value::Mapping(new))) => {
                        path.push(i.to_string());
                        let merged = merge_mappings(old, new, strategy, path)?;
                        path.pop();
                        Value::Mapping(merged)
                    }
                    // Non-map elements replace by index.
                    (_, Some(new)) => new.clone(),
                    (Some(old), None) => old.clone(),
                    (None, None) => unreachable!("index bounded by max length"),
                };
                out.push(merged);
            }
            Ok(Value::Sequence(out))
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Mapping(_) | Value::Sequence(_))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "list",
        Value::Mapping(_) => "map",
        Value::Tagged(_) => "tagged value",
    }
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_else(|_| "?".to_string()),
    }
}
