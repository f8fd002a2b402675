//! Error types for stack-functions

use std::time::Duration;

/// Result type for stack-functions operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while evaluating configuration functions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A recognized tag with malformed arguments. Fatal.
    #[error("malformed function call '{call}': {reason}")]
    UnknownFunction { call: String, reason: String },

    /// The referenced output does not exist yet (component not applied).
    /// Recoverable: the caller may substitute null or abort.
    #[error("output '{output}' not available for component '{component}' in stack '{stack}'")]
    OutputNotAvailable {
        component: String,
        stack: String,
        output: String,
    },

    /// Cross-component function references form a cycle. Fatal, and
    /// distinct from an import cycle.
    #[error("cyclic function dependency: {}", cycle.join(" -> "))]
    CyclicFunctionDependency { cycle: Vec<String> },

    #[error("template render error: {0}")]
    Template(#[from] minijinja::Error),

    #[error("environment variable '{0}' is not set and no default was given")]
    EnvNotSet(String),

    #[error("store '{0}' is not configured")]
    UnknownStore(String),

    #[error("key '{key}' not found in store '{store}'")]
    StoreKeyNotFound { store: String, key: String },

    #[error("command exited with status {code}: {stderr}")]
    CommandFailed { code: i32, stderr: String },

    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    #[error("evaluation cancelled")]
    Cancelled,

    #[error("output backend query failed: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the caller may proceed with a partial result.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::OutputNotAvailable { .. })
    }
}
