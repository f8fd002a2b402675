//! External value providers
//!
//! The evaluator never talks to terraform state or secret stores itself;
//! it goes through these traits, which the orchestration layer wires to
//! real implementations and tests wire to fixtures.

use serde_yaml::Value;

/// Failure modes of a remote output/state lookup.
#[derive(Debug, thiserror::Error)]
pub enum OutputLookupError {
    /// The component exists but its outputs are not available yet
    /// (not provisioned/applied). Recoverable.
    #[error("output not available")]
    NotAvailable,

    /// The query itself failed (backend unreachable, bad attribute).
    #[error("{0}")]
    Query(String),
}

/// Provider of another component's terraform outputs and state attributes.
pub trait OutputBackend {
    fn output(
        &self,
        component: &str,
        stack: &str,
        name: &str,
    ) -> Result<Value, OutputLookupError>;

    fn state(
        &self,
        component: &str,
        stack: &str,
        attribute: &str,
    ) -> Result<Value, OutputLookupError>;
}

/// External key-value store (secrets, remote configuration).
pub trait KvStore {
    /// Look up a key. `Ok(None)` means the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Value>, String>;
}
