//! Just-in-time source provisioning.
//!
//! Components may declare a remote source; before tool invocation the
//! [`Provisioner`] vendors that source into an ephemeral working
//! directory. Key properties:
//!
//!  - a pre-existing local component directory never short-circuits the
//!    fetch (the working directory always reflects the remote source),
//!  - re-provisioning is a no-op only on a content-hash match against the
//!    [`ProvisionManifest`],
//!  - transient fetch failures retry with exponential backoff up to the
//!    descriptor's budget, then surface as a labeled network error,
//!  - same-path provisioning runs are serialized through a lock table.

pub mod error;
pub mod fetch;
pub mod manifest;
pub mod provisioner;

pub use error::{Error, Result};
pub use fetch::{FetchError, Fetcher, GitFetcher, LocalFetcher, fetcher_for};
pub use manifest::{MANIFEST_FILE, ProvisionManifest};
pub use provisioner::{ProvisionState, Provisioned, Provisioner};
