//! Import graph expansion
//!
//! Expands `import:` directives depth-first: a document's imports are
//! emitted before the document itself, so later positions carry higher
//! merge precedence and an importer overrides what it imports. Globs
//! expand lexically sorted; a document reached through several routes is
//! emitted once, at its first visit.

use std::collections::HashSet;
use std::path::Path;

use serde_yaml::Value;
use stack_fs::{Document, DocumentLoader, NormalizedPath, glob_paths};
use tracing::debug;

use crate::error::{Error, Result};

/// One parsed `import:` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Path or glob pattern, relative to the stacks base path.
    pub path: String,
    /// Optional imports that do not resolve are skipped silently.
    pub optional: bool,
}

/// Resolves a document's transitive imports into merge order.
pub struct ImportResolver<'a> {
    loader: &'a DocumentLoader,
    base_path: NormalizedPath,
}

impl<'a> ImportResolver<'a> {
    pub fn new(loader: &'a DocumentLoader, base_path: NormalizedPath) -> Self {
        Self { loader, base_path }
    }

    /// Expand one root document into its full ordered document list,
    /// imports first, the root last.
    pub fn resolve(&self, root: &Document) -> Result<Vec<Document>> {
        self.resolve_all(std::slice::from_ref(root))
    }

    /// Expand several root documents into one ordered list sharing a
    /// dedup set, preserving root order.
    pub fn resolve_all(&self, roots: &[Document]) -> Result<Vec<Document>> {
        let mut out = Vec::new();
        let mut emitted = HashSet::new();
        let mut visiting = Vec::new();
        for root in roots {
            if emitted.contains(&root.path) {
                continue;
            }
            self.visit(root, &mut visiting, &mut emitted, &mut out)?;
        }
        Ok(out)
    }

    fn visit(
        &self,
        doc: &Document,
        visiting: &mut Vec<NormalizedPath>,
        emitted: &mut HashSet<NormalizedPath>,
        out: &mut Vec<Document>,
    ) -> Result<()> {
        visiting.push(doc.path.clone());

        for entry in parse_imports(doc)? {
            for path in self.expand_entry(&entry, doc)? {
                // Compare canonical identities, matching Document::path.
                let path = path
                    .canonicalize()
                    .map_err(|e| stack_fs::Error::io(path.to_native(), e))?;
                if let Some(pos) = visiting.iter().position(|p| p == &path) {
                    let mut cycle: Vec<String> = visiting[pos..]
                        .iter()
                        .map(|p| p.as_str().to_string())
                        .collect();
                    cycle.push(path.as_str().to_string());
                    return Err(Error::CyclicImport { cycle });
                }
                if emitted.contains(&path) {
                    debug!(path = path.as_str(), "import already emitted, skipping");
                    continue;
                }
                let child = self.loader.load(&path)?;
                self.visit(&child, visiting, emitted, out)?;
            }
        }

        visiting.pop();
        emitted.insert(doc.path.clone());
        out.push(doc.clone());
        Ok(())
    }

    /// Expand an entry to concrete paths. Globs may match zero files;
    /// a literal path must exist unless the entry is optional.
    fn expand_entry(&self, entry: &ImportEntry, from: &Document) -> Result<Vec<NormalizedPath>> {
        let target = self.base_path.join(&entry.path);
        if entry.path.contains(['*', '?', '[']) {
            return Ok(glob_paths(target.as_str())?);
        }

        for candidate in [
            target.clone(),
            self.base_path.join(&format!("{}.yaml", entry.path)),
            self.base_path.join(&format!("{}.yml", entry.path)),
        ] {
            if Path::new(candidate.as_str()).is_file() {
                return Ok(vec![candidate]);
            }
        }

        if entry.optional {
            debug!(
                import = entry.path,
                from = from.path.as_str(),
                "optional import not found, skipping"
            );
            return Ok(Vec::new());
        }
        Err(Error::ImportNotFound {
            import: entry.path.clone(),
            from: from.path.as_str().to_string(),
        })
    }
}

/// Read the `import:` section of a document. Entries are strings or
/// mappings with a `path` key and an optional `optional` flag.
pub fn parse_imports(doc: &Document) -> Result<Vec<ImportEntry>> {
    let Some(section) = doc.data.get("import") else {
        return Ok(Vec::new());
    };
    let Value::Sequence(entries) = section else {
        return Err(Error::MalformedImport {
            path: doc.path.as_str().to_string(),
            reason: "'import' must be a list".to_string(),
        });
    };

    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        match entry {
            Value::String(path) => out.push(ImportEntry {
                path: path.clone(),
                optional: false,
            }),
            Value::Mapping(map) => {
                let Some(Value::String(path)) = map.get("path") else {
                    return Err(Error::MalformedImport {
                        path: doc.path.as_str().to_string(),
                        reason: "import mapping requires a string 'path'".to_string(),
                    });
                };
                let optional = matches!(map.get("optional"), Some(Value::Bool(true)));
                out.push(ImportEntry {
                    path: path.clone(),
                    optional,
                });
            }
            other => {
                return Err(Error::MalformedImport {
                    path: doc.path.as_str().to_string(),
                    reason: format!("unsupported import entry: {other:?}"),
                });
            }
        }
    }
    Ok(out)
}
