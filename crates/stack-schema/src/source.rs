//! Source descriptor for just-in-time provisioning

use serde::{Deserialize, Serialize};

/// Remote source attached to a component.
///
/// Read at assembly time and consumed once per tool invocation by the
/// source provisioner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Source location. Git URIs may carry a `?ref=` suffix as an
    /// alternative to the explicit `version` field.
    pub uri: String,

    /// Ref/version to check out (branch, tag or commit).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Working-directory provisioning settings.
    #[serde(default)]
    pub workdir: WorkdirSettings,

    /// Retry policy for transient fetch failures.
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl SourceDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            version: None,
            workdir: WorkdirSettings::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// URI with any `?ref=` suffix stripped, plus the effective ref.
    ///
    /// An explicit `version` field wins over a `?ref=` suffix.
    pub fn uri_and_ref(&self) -> (&str, Option<&str>) {
        match self.uri.split_once("?ref=") {
            Some((uri, suffix)) => (uri, self.version.as_deref().or(Some(suffix))),
            None => (self.uri.as_str(), self.version.as_deref()),
        }
    }
}

/// Whether the component vendors into an ephemeral working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkdirSettings {
    #[serde(default)]
    pub enabled: bool,
}

/// Bounded retry with exponential backoff for transient fetch errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds; doubles per attempt.
    #[serde(default = "default_backoff_ms")]
    pub initial_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    250
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_backoff_ms(),
        }
    }
}
