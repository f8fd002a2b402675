//! Document loader
//!
//! Loads configuration documents from YAML, JSON, TOML and `.tfvars` files
//! into ordered `serde_yaml` mappings. During loading:
//!
//! - `!include <path> [<expression>]` nodes are resolved in place, with
//!   cycle detection across nested includes and an optional dot-path
//!   extraction expression pulling a sub-value out of the target.
//! - Recognized function tags (`!template`, `!terraform.output`, ...) are
//!   canonicalized to their string form so the merge layer sees one lexical
//!   shape for every call site.
//! - Unrecognized `!`-tags pass through untouched as opaque tagged values.

use crate::{Error, NormalizedPath, Result};
use serde_yaml::{Mapping, Value};
use stack_schema::FunctionCall;

/// One loaded configuration document, identified by its resolved path.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: NormalizedPath,
    pub data: Mapping,
}

/// Loads documents and resolves `!include` directives.
#[derive(Debug, Default)]
pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a document from a local file.
    ///
    /// The document's identity is its canonicalized absolute path, so the
    /// same physical file always produces the same `Document::path`.
    pub fn load(&self, path: &NormalizedPath) -> Result<Document> {
        let canonical = path
            .canonicalize()
            .map_err(|e| Error::io(path.to_native(), e))?;
        let mut include_stack = Vec::new();
        let value = self.load_value(&canonical, &mut include_stack)?;
        let data = match value {
            Value::Mapping(map) => map,
            Value::Null => Mapping::new(),
            other => {
                return Err(Error::DocumentParse {
                    path: canonical.to_native(),
                    format: format_name(&canonical).to_string(),
                    message: format!("expected a mapping at the top level, got {}", type_name(&other)),
                });
            }
        };
        Ok(Document {
            path: canonical,
            data,
        })
    }

    fn load_value(
        &self,
        path: &NormalizedPath,
        include_stack: &mut Vec<NormalizedPath>,
    ) -> Result<Value> {
        if include_stack.contains(path) {
            let mut cycle: Vec<String> =
                include_stack.iter().map(|p| p.to_string()).collect();
            cycle.push(path.to_string());
            return Err(Error::IncludeCycle { cycle });
        }
        include_stack.push(path.clone());

        let content = crate::io::read_text(path)?;
        let raw = parse_by_extension(path, &content)?;
        let base_dir = path.parent().unwrap_or_else(|| NormalizedPath::new("."));
        let processed = self.postprocess(raw, &base_dir, path, include_stack)?;

        include_stack.pop();
        Ok(processed)
    }

    /// Walk a freshly parsed value tree, resolving includes and
    /// canonicalizing recognized function tags.
    fn postprocess(
        &self,
        value: Value,
        base_dir: &NormalizedPath,
        doc_path: &NormalizedPath,
        include_stack: &mut Vec<NormalizedPath>,
    ) -> Result<Value> {
        match value {
            Value::Mapping(map) => {
                let mut out = Mapping::new();
                for (k, v) in map {
                    out.insert(k, self.postprocess(v, base_dir, doc_path, include_stack)?);
                }
                Ok(Value::Mapping(out))
            }
            Value::Sequence(seq) => {
                let items = seq
                    .into_iter()
                    .map(|v| self.postprocess(v, base_dir, doc_path, include_stack))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Value::Sequence(items))
            }
            Value::Tagged(tagged) => {
                let tag = tagged.tag.to_string();
                let tag = tag.trim_start_matches('!');
                if tag == "include" {
                    return self.resolve_include(
                        &tagged.value,
                        base_dir,
                        doc_path,
                        include_stack,
                    );
                }
                if let Value::String(body) = &tagged.value {
                    if let Some(call) = FunctionCall::from_tag(tag, body) {
                        return Ok(Value::String(call.to_string()));
                    }
                }
                // Opaque passthrough for unrecognized tags.
                Ok(Value::Tagged(tagged))
            }
            other => Ok(other),
        }
    }

    fn resolve_include(
        &self,
        body: &Value,
        base_dir: &NormalizedPath,
        doc_path: &NormalizedPath,
        include_stack: &mut Vec<NormalizedPath>,
    ) -> Result<Value> {
        let Value::String(body) = body else {
            return Err(Error::DocumentParse {
                path: doc_path.to_native(),
                format: "yaml".to_string(),
                message: "!include expects a string argument".to_string(),
            });
        };

        let (target, expression) = split_include_args(body);
        let target_path = if target.starts_with('/') {
            NormalizedPath::new(&target)
        } else {
            base_dir.join(&target)
        };
        let target_path = target_path
            .canonicalize()
            .map_err(|_| Error::IncludeNotFound {
                path: target_path.to_native(),
                included_from: doc_path.to_native(),
            })?;

        tracing::debug!(target = %target_path, from = %doc_path, "Resolving include");
        let value = self.load_value(&target_path, include_stack)?;

        match expression {
            Some(expr) => extract_path(&value, &expr).ok_or_else(|| Error::ExtractionFailed {
                path: target_path.to_native(),
                expression: expr,
            }),
            None => Ok(value),
        }
    }
}

/// Expand a glob pattern into lexically sorted matches.
///
/// Zero matches is not an error; callers decide whether an empty expansion
/// is acceptable.
pub fn glob_paths(pattern: &str) -> Result<Vec<NormalizedPath>> {
    let entries = glob::glob(pattern).map_err(|e| Error::GlobPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })?;

    let mut paths = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => paths.push(NormalizedPath::new(path)),
            Ok(_) => {}
            Err(e) => {
                return Err(Error::GlobPattern {
                    pattern: pattern.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    paths.sort();
    Ok(paths)
}

fn format_name(path: &NormalizedPath) -> &'static str {
    match path.extension() {
        Some("yaml") | Some("yml") => "yaml",
        Some("json") => "json",
        Some("toml") => "toml",
        Some("tfvars") => "tfvars",
        _ => "unknown",
    }
}

fn parse_by_extension(path: &NormalizedPath, content: &str) -> Result<Value> {
    let parse_err = |format: &str, message: String| Error::DocumentParse {
        path: path.to_native(),
        format: format.to_string(),
        message,
    };

    match path.extension() {
        Some("yaml") | Some("yml") => {
            serde_yaml::from_str(content).map_err(|e| parse_err("yaml", e.to_string()))
        }
        Some("json") => {
            let json: serde_json::Value =
                serde_json::from_str(content).map_err(|e| parse_err("json", e.to_string()))?;
            serde_yaml::to_value(json).map_err(|e| parse_err("json", e.to_string()))
        }
        Some("toml") => {
            let toml: toml::Value =
                toml::from_str(content).map_err(|e| parse_err("toml", e.to_string()))?;
            serde_yaml::to_value(toml).map_err(|e| parse_err("toml", e.to_string()))
        }
        Some("tfvars") => Ok(parse_tfvars(content)),
        other => Err(Error::UnsupportedFormat {
            extension: other.unwrap_or("").to_string(),
        }),
    }
}

/// Parse simple `key = value` tfvars assignments.
///
/// Values are interpreted as JSON where possible (numbers, booleans,
/// quoted strings, inline arrays), falling back to the raw token. Block
/// constructs are out of scope; tfvars files are raw inclusion targets.
fn parse_tfvars(content: &str) -> Value {
    let mut map = Mapping::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
            continue;
        }
        let Some((key, raw)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let raw = raw.trim();
        let value = match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(json) => serde_yaml::to_value(json).unwrap_or(Value::Null),
            Err(_) => Value::String(raw.trim_matches('"').trim_matches('\'').to_string()),
        };
        map.insert(Value::String(key.to_string()), value);
    }
    Value::Mapping(map)
}

/// Split an `!include` body into target path and optional extraction
/// expression. The path may be quoted to allow spaces.
fn split_include_args(body: &str) -> (String, Option<String>) {
    let body = body.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = body.strip_prefix(quote) {
            if let Some(end) = rest.find(quote) {
                let path = rest[..end].to_string();
                let expr = rest[end + 1..].trim();
                let expr = (!expr.is_empty()).then(|| expr.to_string());
                return (path, expr);
            }
        }
    }
    match body.split_once(char::is_whitespace) {
        Some((path, expr)) => {
            let expr = expr.trim();
            (
                path.to_string(),
                (!expr.is_empty()).then(|| expr.to_string()),
            )
        }
        None => (body.to_string(), None),
    }
}

/// Descend a value by a dot-joined path expression (`.a.b.0`).
///
/// Mapping segments select by string key, sequence segments by decimal
/// index.
fn extract_path<'a>(value: &'a Value, expression: &str) -> Option<Value> {
    let mut current: &'a Value = value;
    for segment in expression.trim_start_matches('.').split('.') {
        if segment.is_empty() {
            continue;
        }
        current = match current {
            Value::Mapping(map) => map.get(segment)?,
            Value::Sequence(seq) => seq.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write(dir: &std::path::Path, name: &str, content: &str) -> NormalizedPath {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        NormalizedPath::new(path)
    }

    #[test]
    fn loads_yaml_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "dev.yaml", "vars:\n  stage: dev\n");
        let doc = DocumentLoader::new().load(&path).unwrap();
        assert_eq!(doc.data.get("vars").unwrap()["stage"], Value::from("dev"));
    }

    #[test]
    fn function_tags_are_canonicalized_to_strings() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "dev.yaml",
            "vars:\n  vpc_id: !terraform.output vpc dev id\n",
        );
        let doc = DocumentLoader::new().load(&path).unwrap();
        assert_eq!(
            doc.data.get("vars").unwrap()["vpc_id"],
            Value::String("!terraform.output vpc dev id".into())
        );
    }

    #[test]
    fn unrecognized_tags_pass_through_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "dev.yaml", "vars:\n  special: !custom.ref abc\n");
        let doc = DocumentLoader::new().load(&path).unwrap();
        match &doc.data.get("vars").unwrap()["special"] {
            Value::Tagged(tagged) => {
                assert_eq!(tagged.tag.to_string(), "!custom.ref");
                assert_eq!(tagged.value, Value::String("abc".into()));
            }
            other => panic!("expected tagged value, got {other:?}"),
        }
    }

    #[test]
    fn include_pulls_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "fragment.yaml", "region: us-east-1\n");
        let path = write(dir.path(), "dev.yaml", "vars: !include fragment.yaml\n");
        let doc = DocumentLoader::new().load(&path).unwrap();
        assert_eq!(
            doc.data.get("vars").unwrap()["region"],
            Value::from("us-east-1")
        );
    }

    #[test]
    fn include_with_extraction_expression() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "shared.yaml",
            "networks:\n  - cidr: 10.0.0.0/16\n  - cidr: 10.1.0.0/16\n",
        );
        let path = write(
            dir.path(),
            "dev.yaml",
            "vars:\n  cidr: !include shared.yaml .networks.1.cidr\n",
        );
        let doc = DocumentLoader::new().load(&path).unwrap();
        assert_eq!(
            doc.data.get("vars").unwrap()["cidr"],
            Value::from("10.1.0.0/16")
        );
    }

    #[test]
    fn include_of_json_and_tfvars_targets() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "extra.json", r#"{"replicas": 3}"#);
        write(
            dir.path(),
            "legacy.tfvars",
            "region = \"us-west-2\"\ncount = 2\nenabled = true\n# comment\n",
        );
        let path = write(
            dir.path(),
            "dev.yaml",
            "a: !include extra.json .replicas\nb: !include legacy.tfvars\n",
        );
        let doc = DocumentLoader::new().load(&path).unwrap();
        assert_eq!(doc.data.get("a").unwrap(), &Value::from(3));
        let b = doc.data.get("b").unwrap();
        assert_eq!(b["region"], Value::from("us-west-2"));
        assert_eq!(b["count"], Value::from(2));
        assert_eq!(b["enabled"], Value::from(true));
    }

    #[test]
    fn cyclic_include_is_reported_with_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.yaml", "x: !include b.yaml\n");
        write(dir.path(), "b.yaml", "y: !include a.yaml\n");
        let path = NormalizedPath::new(dir.path().join("a.yaml"));
        let err = DocumentLoader::new().load(&path).unwrap_err();
        match err {
            Error::IncludeCycle { cycle } => {
                assert!(cycle.iter().any(|p| p.ends_with("a.yaml")));
                assert!(cycle.iter().any(|p| p.ends_with("b.yaml")));
            }
            other => panic!("expected IncludeCycle, got {other}"),
        }
    }

    #[test]
    fn missing_include_target_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "dev.yaml", "vars: !include nope.yaml\n");
        let err = DocumentLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, Error::IncludeNotFound { .. }));
    }

    #[test]
    fn glob_paths_are_sorted_lexically() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.yaml", "x: 1\n");
        write(dir.path(), "a.yaml", "x: 1\n");
        write(dir.path(), "c.yaml", "x: 1\n");
        let pattern = format!("{}/*.yaml", dir.path().display());
        let paths = glob_paths(&pattern).unwrap();
        let names: Vec<_> = paths.iter().filter_map(|p| p.file_name()).collect();
        assert_eq!(names, vec!["a.yaml", "b.yaml", "c.yaml"]);
    }

    #[test]
    fn split_include_args_handles_quoted_paths() {
        let (path, expr) = split_include_args("'my dir/file.yaml' .a.b");
        assert_eq!(path, "my dir/file.yaml");
        assert_eq!(expr.as_deref(), Some(".a.b"));

        let (path, expr) = split_include_args("plain.yaml");
        assert_eq!(path, "plain.yaml");
        assert_eq!(expr, None);
    }
}
