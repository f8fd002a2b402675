//! Error types for stack-core

/// Result type for stack-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during import resolution and assembly
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The import graph re-enters a document already on the DFS stack.
    /// Detected before any merge work runs.
    #[error("cyclic import: {}", cycle.join(" -> "))]
    CyclicImport { cycle: Vec<String> },

    /// A required import did not resolve to any document.
    #[error("import '{import}' (from '{from}') not found")]
    ImportNotFound { import: String, from: String },

    /// No stack document declares membership in the requested stack.
    #[error("no configuration found for stack '{0}'")]
    StackNotFound(String),

    /// The merged stack has no such component.
    #[error("component '{component}' not defined in stack '{stack}'")]
    ComponentNotFound { component: String, stack: String },

    /// Deferred placeholders survived evaluation. Internal invariant,
    /// not a user input error.
    #[error("unresolved function placeholders remain at: {}", paths.join(", "))]
    UnresolvedPlaceholders { paths: Vec<String> },

    /// The `import:` section is not a sequence of strings/mappings.
    #[error("malformed import entry in '{path}': {reason}")]
    MalformedImport { path: String, reason: String },

    #[error(transparent)]
    Fs(#[from] stack_fs::Error),

    #[error(transparent)]
    Merge(#[from] stack_merge::Error),

    #[error(transparent)]
    Functions(#[from] stack_functions::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}
