//! Error types for stack-provision

/// Result type for stack-provision operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while provisioning component sources
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transient fetch failures exhausted the retry budget. Surfaced to
    /// the user as a network error; the provisioner never falls back to
    /// a local copy.
    #[error("fetching '{uri}' failed after {attempts} attempts: {message}")]
    FetchRetryExhausted {
        uri: String,
        attempts: u32,
        message: String,
    },

    /// A non-transient fetch failure (bad ref, missing source path).
    #[error("cannot provision '{uri}': {message}")]
    FetchFailed { uri: String, message: String },

    #[error("provisioning cancelled")]
    Cancelled,

    #[error(transparent)]
    Fs(#[from] stack_fs::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}
