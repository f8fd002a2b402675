//! Stack file discovery
//!
//! Finds the configuration documents that declare membership in a stack.
//! A document is a member when its file stem equals the stack name, or
//! when its top-level `name:` value equals the stack name or is a glob
//! pattern matching it (tenant patterns like `tenant-*`).

use glob::Pattern;
use serde_yaml::Value;
use stack_fs::{Document, DocumentLoader, NormalizedPath, glob_paths};
use stack_schema::StackDiscovery;
use tracing::debug;

use crate::error::Result;

/// Discover member documents for `stack`, in lexical path order per
/// include pattern.
pub fn discover_stack_documents(
    loader: &DocumentLoader,
    discovery: &StackDiscovery,
    stack: &str,
) -> Result<Vec<Document>> {
    let base = NormalizedPath::new(&discovery.base_path);
    let mut docs = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for pattern in &discovery.included_paths {
        let full = base.join(pattern);
        for path in glob_paths(full.as_str())? {
            if is_excluded(&base, &path, &discovery.excluded_paths) {
                debug!(path = path.as_str(), "stack file excluded");
                continue;
            }
            let doc = loader.load(&path)?;
            if !seen.insert(doc.path.clone()) {
                continue;
            }
            if is_member(&doc, stack) {
                docs.push(doc);
            }
        }
    }
    Ok(docs)
}

fn is_excluded(base: &NormalizedPath, path: &NormalizedPath, excluded: &[String]) -> bool {
    let rel = path
        .as_str()
        .strip_prefix(base.as_str())
        .map(|s| s.trim_start_matches('/'))
        .unwrap_or(path.as_str());
    excluded.iter().any(|pattern| {
        Pattern::new(pattern)
            .map(|p| p.matches(rel))
            .unwrap_or(false)
    })
}

/// Membership: file stem equality, or a top-level `name:` that equals
/// the stack or glob-matches it.
fn is_member(doc: &Document, stack: &str) -> bool {
    if doc.path.file_stem() == Some(stack) {
        return true;
    }
    match doc.data.get("name") {
        Some(Value::String(name)) => {
            name == stack
                || Pattern::new(name)
                    .map(|p| p.matches(stack))
                    .unwrap_or(false)
        }
        _ => false,
    }
}
