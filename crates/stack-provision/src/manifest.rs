//! Provisioning manifest
//!
//! A small JSON file written into the working directory after a fetch,
//! recording what was provisioned and the tree checksum at the time. The
//! idempotence check compares the current tree contents against it.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stack_fs::NormalizedPath;
use uuid::Uuid;

use crate::error::Result;

/// File name of the manifest inside a provisioned working directory.
pub const MANIFEST_FILE: &str = ".provision-manifest.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionManifest {
    /// Source URI (without any `?ref=` suffix).
    pub uri: String,
    /// Ref that was checked out, if any.
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none", default)]
    pub reference: Option<String>,
    /// Tree checksum of the provisioned content, manifest excluded.
    pub checksum: String,
    /// When the fetch completed.
    pub provisioned_at: DateTime<Utc>,
    /// Provisioning session that produced this tree.
    pub session: Uuid,
}

impl ProvisionManifest {
    pub fn new(uri: &str, reference: Option<&str>, checksum: String) -> Self {
        Self {
            uri: uri.to_string(),
            reference: reference.map(str::to_string),
            checksum,
            provisioned_at: Utc::now(),
            session: Uuid::new_v4(),
        }
    }

    /// Read the manifest from a working directory. `Ok(None)` when the
    /// directory has no manifest (never provisioned, or foreign content).
    pub fn read_from(workdir: &Path) -> Result<Option<Self>> {
        let path = workdir.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Write the manifest into a working directory. The write is atomic
    /// so a concurrent reader never sees a partial manifest.
    pub fn write_to(&self, workdir: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        let path = NormalizedPath::new(workdir.join(MANIFEST_FILE));
        stack_fs::io::write_atomic(&path, raw.as_bytes())?;
        Ok(())
    }
}
