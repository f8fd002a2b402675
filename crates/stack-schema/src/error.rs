//! Error types for stack-schema

/// Result type for stack-schema operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stack-schema operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
