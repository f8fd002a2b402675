//! Deferred-function merge layer
//!
//! Wraps the merge engine with a two-phase pipeline. Phase one scans every
//! input for recognized function call sites, replaces each with a null
//! placeholder so the structural merge can never hit a type conflict
//! against them, and records the call in a `DeferredContext` tagged with
//! the input's precedence rank. Phase two, after the structural merge,
//! evaluates the recorded calls through a `FunctionProcessor` and writes
//! the winning values back per the active merge strategy.

use crate::merge::merge_values;
use crate::{Error, Result};
use serde_yaml::{Mapping, Value};
use stack_schema::{FunctionCall, ListMergeStrategy};
use std::collections::BTreeMap;

/// A recorded, not-yet-evaluated value at one key path.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredValue {
    pub value: Value,
    /// Rank of the originating input; higher rank overrides lower.
    pub precedence: usize,
    /// Whether `value` is still an unevaluated function call string.
    pub is_function: bool,
    /// Originating document, for diagnostics.
    pub source: Option<String>,
}

/// Ordered collection of deferred values keyed by dot-joined key path.
///
/// Multiple values may exist at the same path (one per contributing
/// input); they are kept as an ordered list, not collapsed, because the
/// winner depends on the active merge strategy.
#[derive(Debug, Default)]
pub struct DeferredContext {
    values: BTreeMap<String, Vec<DeferredValue>>,
    precedence: usize,
    current_source: Option<String>,
}

impl DeferredContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deferred value at the given path segments under the
    /// current precedence rank.
    pub fn add_deferred(&mut self, path: &[String], value: Value) {
        let is_function = matches!(&value, Value::String(s) if FunctionCall::is_function_str(s));
        self.values.entry(path.join(".")).or_default().push(DeferredValue {
            value,
            precedence: self.precedence,
            is_function,
            source: self.current_source.clone(),
        });
    }

    /// Advance to the next input's precedence rank.
    pub fn increment_precedence(&mut self) {
        self.precedence += 1;
    }

    /// Set the document attributed to subsequently recorded values.
    pub fn set_source(&mut self, source: Option<String>) {
        self.current_source = source;
    }

    pub fn has_deferred_values(&self) -> bool {
        !self.values.is_empty()
    }

    pub fn deferred_values(&self) -> &BTreeMap<String, Vec<DeferredValue>> {
        &self.values
    }
}

/// Evaluates a deferred function call at resolution time.
///
/// Implemented by the function evaluator; the merge layer stays ignorant
/// of how any function is executed.
pub trait FunctionProcessor {
    fn process(&self, call: &FunctionCall, key_path: &str) -> std::result::Result<Value, ProcessorError>;
}

/// Classified processor failure.
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    /// Parse/syntax failures and execution errors; aborts the resolution.
    #[error("{0}")]
    Fatal(String),
    /// The referenced value is not available yet (e.g. an unapplied
    /// component's output); the caller decides whether to abort.
    #[error("{0}")]
    Recoverable(String),
}

/// Replace every recognized function call site in `input` with a null
/// placeholder, recording each occurrence in `ctx`.
pub fn walk_and_defer(ctx: &mut DeferredContext, input: &Mapping, path: &[String]) -> Mapping {
    let mut out = Mapping::new();
    for (key, value) in input {
        let Value::String(key_name) = key else {
            // Non-string keys cannot be addressed; leave them untouched.
            out.insert(key.clone(), value.clone());
            continue;
        };
        let mut child_path = path.to_vec();
        child_path.push(key_name.clone());
        out.insert(key.clone(), defer_value(ctx, value, &child_path));
    }
    out
}

fn defer_value(ctx: &mut DeferredContext, value: &Value, path: &[String]) -> Value {
    match value {
        Value::String(s) if FunctionCall::is_function_str(s) => {
            ctx.add_deferred(path, value.clone());
            Value::Null
        }
        Value::Mapping(map) => Value::Mapping(walk_and_defer(ctx, map, path)),
        Value::Sequence(seq) => {
            // Functions nested in list elements are addressed positionally.
            let items = seq
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let mut child_path = path.to_vec();
                    child_path.push(i.to_string());
                    defer_value(ctx, item, &child_path)
                })
                .collect();
            Value::Sequence(items)
        }
        other => other.clone(),
    }
}

/// Merge inputs with function call sites deferred.
///
/// Returns the structurally merged result (function sites are null unless
/// a concrete value from some input won at that path) together with the
/// context holding every deferred call in precedence order.
pub fn merge_with_deferred(
    strategy: ListMergeStrategy,
    inputs: &[Mapping],
) -> Result<(Mapping, DeferredContext)> {
    let tagged: Vec<(Option<String>, &Mapping)> = inputs.iter().map(|m| (None, m)).collect();
    merge_tagged(strategy, &tagged)
}

/// Like [`merge_with_deferred`], attributing each input to a source
/// document path for diagnostics.
pub fn merge_documents_with_deferred(
    strategy: ListMergeStrategy,
    inputs: &[(String, Mapping)],
) -> Result<(Mapping, DeferredContext)> {
    let tagged: Vec<(Option<String>, &Mapping)> = inputs
        .iter()
        .map(|(source, m)| (Some(source.clone()), m))
        .collect();
    merge_tagged(strategy, &tagged)
}

fn merge_tagged(
    strategy: ListMergeStrategy,
    inputs: &[(Option<String>, &Mapping)],
) -> Result<(Mapping, DeferredContext)> {
    let mut ctx = DeferredContext::new();
    let mut walked = Vec::with_capacity(inputs.len());
    for (i, (source, input)) in inputs.iter().enumerate() {
        ctx.set_source(source.clone());
        walked.push(walk_and_defer(&mut ctx, input, &[]));
        if i + 1 < inputs.len() {
            ctx.increment_precedence();
        }
    }
    ctx.set_source(None);
    let result = crate::merge::merge(strategy, &walked)?;
    if matches!(strategy, ListMergeStrategy::Append) {
        shift_append_indexes(&mut ctx, &walked);
    }
    Ok((result, ctx))
}

/// Rewrite recorded sequence positions for the append strategy.
///
/// Appending shifts every list element by the combined length of the
/// lists contributed at the same path by lower-rank inputs, so the
/// in-document index recorded at walk time no longer names the element's
/// merged slot. Requalifying here keeps one path per element: two inputs
/// each deferring at list index 0 resolve into distinct slots instead of
/// colliding.
fn shift_append_indexes(ctx: &mut DeferredContext, walked: &[Mapping]) {
    let values = std::mem::take(&mut ctx.values);
    let mut remapped: BTreeMap<String, Vec<DeferredValue>> = BTreeMap::new();
    for (path, recorded) in values {
        for value in recorded {
            let key = shifted_sequence_path(&path, value.precedence, walked);
            remapped.entry(key).or_default().push(value);
        }
    }
    ctx.values = remapped;
}

/// Shift the outermost sequence index in `path` from its position in the
/// rank's input to its position in the appended result. Deeper indexes
/// stay relative to their element, which appends carry whole.
fn shifted_sequence_path(path: &str, rank: usize, walked: &[Mapping]) -> String {
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        let Ok(index) = segment.parse::<usize>() else {
            continue;
        };
        let prefix = &segments[..i];
        // A numeric map key is not a sequence position.
        let Some(Value::Sequence(_)) = get_value_at_path(&walked[rank], prefix) else {
            continue;
        };
        let offset: usize = walked[..rank]
            .iter()
            .map(|doc| match get_value_at_path(doc, prefix) {
                Some(Value::Sequence(seq)) => seq.len(),
                _ => 0,
            })
            .sum();
        if offset == 0 {
            return path.to_string();
        }
        let mut shifted: Vec<String> = segments.iter().map(|s| (*s).to_string()).collect();
        shifted[i] = (offset + index).to_string();
        return shifted.join(".");
    }
    path.to_string()
}

/// Resolve deferred values into `result` after the structural merge.
///
/// For each key path, in precedence order: a concrete value already
/// occupying the path always wins and the deferred values are dropped
/// unevaluated. Otherwise functions are evaluated through `processor`
/// (under "replace", only the highest-precedence value; under "append"
/// and "merge", all of them) and combined per the active strategy.
pub fn apply_deferred_merges(
    ctx: &DeferredContext,
    result: &mut Mapping,
    strategy: ListMergeStrategy,
    processor: Option<&dyn FunctionProcessor>,
) -> Result<()> {
    if !ctx.has_deferred_values() {
        return Ok(());
    }

    for (key_path, recorded) in ctx.deferred_values() {
        let segments: Vec<&str> = key_path.split('.').collect();

        // Concrete always beats deferred, regardless of rank.
        if let Some(existing) = get_value_at_path(result, &segments) {
            if !matches!(existing, Value::Null) {
                tracing::debug!(path = %key_path, "Concrete value overrides deferred function");
                continue;
            }
        }

        let mut values = recorded.clone();
        values.sort_by_key(|v| v.precedence);

        if let Some(processor) = processor {
            let eval_from = match strategy {
                // Only the winning value is evaluated under replace.
                ListMergeStrategy::Replace => values.len().saturating_sub(1),
                ListMergeStrategy::Append | ListMergeStrategy::Merge => 0,
            };
            for deferred in &mut values[eval_from..] {
                process_function(deferred, processor, key_path)?;
            }
        }

        let merged = merge_deferred_values(&values, strategy)?;
        set_value_at_path(result, &segments, merged)?;
    }
    Ok(())
}

fn process_function(
    deferred: &mut DeferredValue,
    processor: &dyn FunctionProcessor,
    key_path: &str,
) -> Result<()> {
    if !deferred.is_function {
        return Ok(());
    }
    let Value::String(raw) = &deferred.value else {
        return Ok(());
    };
    let Some(call) = FunctionCall::parse_str(raw) else {
        return Ok(());
    };

    match processor.process(&call, key_path) {
        Ok(value) => {
            deferred.value = value;
            deferred.is_function = false;
            Ok(())
        }
        Err(ProcessorError::Fatal(message)) => Err(Error::FunctionResolution {
            path: key_path.to_string(),
            recoverable: false,
            message,
        }),
        Err(ProcessorError::Recoverable(message)) => Err(Error::FunctionResolution {
            path: key_path.to_string(),
            recoverable: true,
            message,
        }),
    }
}

/// Combine deferred values recorded at one key path.
pub fn merge_deferred_values(
    values: &[DeferredValue],
    strategy: ListMergeStrategy,
) -> Result<Value> {
    match values {
        [] => Ok(Value::Null),
        [single] => Ok(single.value.clone()),
        _ => {
            if values.iter().all(|v| matches!(v.value, Value::Mapping(_))) {
                let mut merged = values[0].value.clone();
                for v in &values[1..] {
                    merged = merge_values(&merged, &v.value, strategy, &mut Vec::new())?;
                }
                Ok(merged)
            } else if values.iter().any(|v| matches!(v.value, Value::Sequence(_))) {
                merge_slices(values, strategy)
            } else {
                // Simple values: last (highest precedence) wins.
                Ok(values[values.len() - 1].value.clone())
            }
        }
    }
}

/// Combine list-typed deferred values per the list strategy, skipping
/// values that did not evaluate to lists.
fn merge_slices(values: &[DeferredValue], strategy: ListMergeStrategy) -> Result<Value> {
    let slices: Vec<&Vec<Value>> = values
        .iter()
        .filter_map(|v| match &v.value {
            Value::Sequence(seq) => Some(seq),
            _ => None,
        })
        .collect();

    match strategy {
        ListMergeStrategy::Replace => Ok(slices
            .last()
            .map(|s| Value::Sequence((*s).clone()))
            .unwrap_or(Value::Null)),
        ListMergeStrategy::Append => {
            let mut out = Vec::new();
            for slice in slices {
                out.extend(slice.iter().cloned());
            }
            Ok(Value::Sequence(out))
        }
        ListMergeStrategy::Merge => {
            let mut merged: Option<Value> = None;
            for slice in slices {
                let incoming = Value::Sequence(slice.clone());
                merged = Some(match merged {
                    Some(acc) => merge_values(&acc, &incoming, strategy, &mut Vec::new())?,
                    None => incoming,
                });
            }
            Ok(merged.unwrap_or(Value::Null))
        }
    }
}

/// Look up a value by path segments (mapping keys or list indexes).
pub fn get_value_at_path<'a>(root: &'a Mapping, segments: &[&str]) -> Option<&'a Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = root.get(*first)?;
    for segment in rest {
        current = match current {
            Value::Mapping(map) => map.get(*segment)?,
            Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write a value at the given path segments, creating intermediate maps
/// as needed. List indexes are only traversed, never created.
pub fn set_value_at_path(root: &mut Mapping, segments: &[&str], value: Value) -> Result<()> {
    let Some((last, intermediate)) = segments.split_last() else {
        return Err(Error::EmptyPath);
    };
    if intermediate.is_empty() {
        root.insert(Value::String((*last).to_string()), value);
        return Ok(());
    }

    let mut current: &mut Value = root
        .entry(Value::String(intermediate[0].to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));

    for (i, segment) in intermediate.iter().enumerate().skip(1) {
        let parent_path = segments[..i].join(".");
        current = match current {
            Value::Mapping(map) => map
                .entry(Value::String((*segment).to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new())),
            Value::Sequence(seq) => {
                let index = segment
                    .parse::<usize>()
                    .map_err(|_| Error::PathNotTraversable { path: parent_path.clone() })?;
                seq.get_mut(index)
                    .ok_or(Error::IndexOutOfBounds { path: parent_path, index })?
            }
            _ => return Err(Error::PathNotTraversable { path: parent_path }),
        };
    }

    let parent_path = intermediate.join(".");
    match current {
        Value::Mapping(map) => {
            map.insert(Value::String((*last).to_string()), value);
            Ok(())
        }
        Value::Sequence(seq) => {
            let index = last
                .parse::<usize>()
                .map_err(|_| Error::PathNotTraversable { path: parent_path.clone() })?;
            let slot = seq
                .get_mut(index)
                .ok_or(Error::IndexOutOfBounds { path: parent_path, index })?;
            *slot = value;
            Ok(())
        }
        _ => Err(Error::PathNotTraversable { path: parent_path }),
    }
}

/// Collect key paths of any function call strings remaining in a tree.
///
/// After `apply_deferred_merges` with a processor, a non-empty result is
/// an internal invariant violation, not a user input error.
pub fn find_unresolved_functions(root: &Mapping) -> Vec<String> {
    let mut found = Vec::new();
    collect_unresolved(root, &mut Vec::new(), &mut found);
    found
}

fn collect_unresolved(map: &Mapping, path: &mut Vec<String>, found: &mut Vec<String>) {
    for (key, value) in map {
        let label = match key {
            Value::String(s) => s.clone(),
            other => format!("{other:?}"),
        };
        path.push(label);
        match value {
            Value::String(s) if FunctionCall::is_function_str(s) => {
                found.push(path.join("."));
            }
            Value::Mapping(inner) => collect_unresolved(inner, path, found),
            Value::Sequence(seq) => {
                for (i, item) in seq.iter().enumerate() {
                    path.push(i.to_string());
                    if let Value::Mapping(inner) = item {
                        collect_unresolved(inner, path, found);
                    } else if let Value::String(s) = item {
                        if FunctionCall::is_function_str(s) {
                            found.push(path.join("."));
                        }
                    }
                    path.pop();
                }
            }
            _ => {}
        }
        path.pop();
    }
}
