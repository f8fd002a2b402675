//! Error types for stack-merge

/// Result type for stack-merge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stack-merge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two concrete values of incompatible shapes met at the same key path.
    /// Deferred-function placeholders never trigger this.
    #[error("merge type conflict at '{path}': cannot merge {incoming} into {existing}")]
    TypeConflict {
        path: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("cannot set a value at an empty key path")]
    EmptyPath,

    #[error("cannot descend into non-map, non-list value at '{path}'")]
    PathNotTraversable { path: String },

    #[error("list index {index} out of bounds at '{path}'")]
    IndexOutOfBounds { path: String, index: usize },

    /// A deferred function failed to evaluate. `recoverable` mirrors the
    /// processor's classification so callers can choose between aborting
    /// and rendering a partial result.
    #[error("failed to resolve function at '{path}': {message}")]
    FunctionResolution {
        path: String,
        recoverable: bool,
        message: String,
    },
}
