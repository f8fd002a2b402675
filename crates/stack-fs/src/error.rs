//! Error types for stack-fs

use std::path::PathBuf;

/// Result type for stack-fs operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in stack-fs operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {format} document at {path}: {message}")]
    DocumentParse {
        path: PathBuf,
        format: String,
        message: String,
    },

    #[error("Unsupported document format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Invalid glob pattern {pattern}: {message}")]
    GlobPattern { pattern: String, message: String },

    #[error("Cyclic include detected: {}", cycle.join(" -> "))]
    IncludeCycle { cycle: Vec<String> },

    #[error("Include target not found: {path} (included from {included_from})")]
    IncludeNotFound {
        path: PathBuf,
        included_from: PathBuf,
    },

    #[error("Extraction expression {expression} did not match a value in {path}")]
    ExtractionFailed { path: PathBuf, expression: String },

    #[error("Lock acquisition failed for {path}")]
    LockFailed { path: PathBuf },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
