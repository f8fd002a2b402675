//! Resolved component schema
//!
//! The final output of a (stack, component) resolution: stable top-level
//! sections consumed by the external tool-invocation layer.

use crate::error::{Error, Result};
use crate::source::SourceDescriptor;
use serde::{Deserialize, Serialize};
use serde_yaml::Mapping;

/// Fully resolved configuration for one component in one stack.
///
/// Every section is a concrete mapping: no deferred-function placeholder may
/// survive into this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedComponent {
    #[serde(default)]
    pub vars: Mapping,

    #[serde(default)]
    pub env: Mapping,

    #[serde(default)]
    pub settings: Mapping,

    #[serde(default)]
    pub metadata: Mapping,

    #[serde(default)]
    pub backend: Mapping,

    #[serde(default)]
    pub providers: Mapping,

    #[serde(default)]
    pub overrides: Mapping,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDescriptor>,
}

impl ResolvedComponent {
    /// Emit the schema as YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(Error::Yaml)
    }

    /// Emit the schema as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Error::Json)
    }
}
