//! Orchestrator settings threaded explicitly through every phase
//!
//! No phase reads ambient global state: the caller builds one `Settings`
//! value (with already-resolved absolute base paths) and passes it down.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Strategy applied when two list values meet at the same key path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMergeStrategy {
    /// Later list wins wholesale.
    #[default]
    Replace,
    /// Later list is concatenated after the earlier one.
    Append,
    /// Elements are deep-merged pairwise by index; the longer side's tail
    /// is kept.
    Merge,
}

impl ListMergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Merge => "merge",
        }
    }
}

impl std::str::FromStr for ListMergeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            "merge" => Ok(Self::Merge),
            other => Err(format!("unknown list merge strategy: {other}")),
        }
    }
}

/// Stack file discovery settings.
#[derive(Debug, Clone, Default)]
pub struct StackDiscovery {
    /// Absolute base directory holding stack configuration files.
    pub base_path: PathBuf,

    /// Glob patterns (relative to `base_path`) selecting stack files.
    pub included_paths: Vec<String>,

    /// Glob patterns excluding files from discovery (catalogs, mixins).
    pub excluded_paths: Vec<String>,
}

/// Top-level configuration for one resolution request.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Absolute base directory of the project.
    pub base_path: PathBuf,

    /// Stack file discovery.
    pub stacks: StackDiscovery,

    /// List merge strategy applied at every list-typed key path.
    pub list_merge_strategy: ListMergeStrategy,

    /// When true, a recoverable missing terraform output resolves to null
    /// with a warning instead of aborting the resolution.
    pub skip_missing_outputs: bool,

    /// Timeout applied to `!exec` subprocesses.
    pub exec_timeout: Duration,

    /// Timeout applied to network-backed fetches.
    pub fetch_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_path: PathBuf::new(),
            stacks: StackDiscovery::default(),
            list_merge_strategy: ListMergeStrategy::default(),
            skip_missing_outputs: false,
            exec_timeout: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(120),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_parses_from_config_strings() {
        assert_eq!(
            "append".parse::<ListMergeStrategy>().unwrap(),
            ListMergeStrategy::Append
        );
        assert!("smash".parse::<ListMergeStrategy>().is_err());
    }

    #[test]
    fn default_strategy_is_replace() {
        assert_eq!(ListMergeStrategy::default(), ListMergeStrategy::Replace);
    }
}
