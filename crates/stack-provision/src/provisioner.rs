//! The provisioner: lock, check, fetch with retry, swap.
//!
//! Provisioning runs once per tool invocation for any component with a
//! source URI. The working directory is authoritative: a pre-existing
//! local component directory never short-circuits a fetch. Re-running is
//! a no-op only when the current tree content matches the manifest
//! checksum; a directory merely existing is not enough.

use std::path::Path;
use std::time::Duration;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use stack_fs::checksum::compute_tree_checksum_excluding;
use stack_fs::{LockTable, NormalizedPath};
use stack_schema::{Cancellation, SourceDescriptor};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fetch::{Fetcher, fetcher_for};
use crate::manifest::{MANIFEST_FILE, ProvisionManifest};

/// Lifecycle of one provisioning run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Unprovisioned,
    Fetching,
    Provisioned,
    Failed,
}

/// Result of a successful provisioning run.
#[derive(Debug)]
pub struct Provisioned {
    pub workdir: NormalizedPath,
    pub manifest: ProvisionManifest,
    /// True when the existing tree matched the manifest and no fetch ran.
    pub reused: bool,
}

/// Vendors component sources into working directories.
///
/// Concurrent provisioning of the same working directory is serialized
/// through the lock table; distinct directories proceed independently.
pub struct Provisioner {
    locks: LockTable,
    fetch_timeout: Duration,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self {
            locks: LockTable::new(),
            fetch_timeout: Duration::from_secs(120),
        }
    }
}

impl Provisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overall wall-clock budget for the fetch phase, retries included.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Provision `source` into `workdir`, fetching with the descriptor's
    /// retry policy. Uses the default fetcher for the URI scheme.
    pub fn provision(
        &self,
        source: &SourceDescriptor,
        workdir: &NormalizedPath,
        cancel: &Cancellation,
    ) -> Result<Provisioned> {
        let (uri, _) = source.uri_and_ref();
        self.provision_with(fetcher_for(uri).as_ref(), source, workdir, cancel)
    }

    /// Provision with an explicit fetcher. The seam used by tests.
    pub fn provision_with(
        &self,
        fetcher: &dyn Fetcher,
        source: &SourceDescriptor,
        workdir: &NormalizedPath,
        cancel: &Cancellation,
    ) -> Result<Provisioned> {
        let (uri, reference) = source.uri_and_ref();
        let _guard = self.locks.lock(workdir)?;

        let workdir_std = Path::new(workdir.as_str());

        if let Some(manifest) = ProvisionManifest::read_from(workdir_std)? {
            let matches = manifest.uri == uri
                && manifest.reference.as_deref() == reference
                && tree_checksum(workdir_std)? == manifest.checksum;
            if matches {
                debug!(uri, workdir = workdir.as_str(), "content matches manifest, skipping fetch");
                return Ok(Provisioned {
                    workdir: workdir.clone(),
                    manifest,
                    reused: true,
                });
            }
        }

        debug!(uri, ?reference, state = ?ProvisionState::Fetching, "fetching source");

        let parent = workdir_std.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;

        let policy = &source.retry;
        let mut schedule = ExponentialBackoff {
            initial_interval: Duration::from_millis(policy.initial_backoff_ms),
            max_elapsed_time: None,
            ..ExponentialBackoff::default()
        };

        let started = std::time::Instant::now();
        let mut attempt = 0u32;
        let staging = loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if attempt > 0 && started.elapsed() >= self.fetch_timeout {
                return Err(Error::FetchRetryExhausted {
                    uri: uri.to_string(),
                    attempts: attempt,
                    message: format!("fetch budget of {:?} exceeded", self.fetch_timeout),
                });
            }
            attempt += 1;
            let staging = tempfile::Builder::new()
                .prefix(".provision-")
                .tempdir_in(parent)?;
            match fetcher.fetch(uri, reference, staging.path()) {
                Ok(()) => break staging,
                Err(err) if err.transient && attempt < policy.max_attempts => {
                    let delay = schedule
                        .next_backoff()
                        .unwrap_or(Duration::from_millis(policy.initial_backoff_ms));
                    warn!(
                        uri,
                        attempt,
                        max_attempts = policy.max_attempts,
                        ?delay,
                        error = %err.message,
                        "transient fetch failure, retrying"
                    );
                    std::thread::sleep(delay);
                }
                Err(err) if err.transient => {
                    return Err(Error::FetchRetryExhausted {
                        uri: uri.to_string(),
                        attempts: attempt,
                        message: err.message,
                    });
                }
                Err(err) => {
                    return Err(Error::FetchFailed {
                        uri: uri.to_string(),
                        message: err.message,
                    });
                }
            }
        };

        let checksum = tree_checksum(staging.path())?;
        let manifest = ProvisionManifest::new(uri, reference, checksum);
        manifest.write_to(staging.path())?;

        // Swap: drop any previous tree (stale local content included),
        // then move the staged tree into place.
        if workdir_std.exists() {
            std::fs::remove_dir_all(workdir_std)?;
        }
        std::fs::rename(staging.keep(), workdir_std)?;

        debug!(uri, workdir = workdir.as_str(), state = ?ProvisionState::Provisioned, "provisioned");
        Ok(Provisioned {
            workdir: workdir.clone(),
            manifest,
            reused: false,
        })
    }
}

/// Checksum of the tree with the manifest file excluded, so the value is
/// stable across provision/check cycles.
fn tree_checksum(root: &Path) -> std::io::Result<String> {
    compute_tree_checksum_excluding(root, &[MANIFEST_FILE])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingFetcher {
        calls: AtomicU32,
        fail_first: u32,
        transient: bool,
        payload: &'static str,
    }

    impl CountingFetcher {
        fn new(fail_first: u32, transient: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail_first,
                transient,
                payload: "module content\n",
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Fetcher for CountingFetcher {
        fn fetch(
            &self,
            _uri: &str,
            _reference: Option<&str>,
            dest: &Path,
        ) -> std::result::Result<(), FetchError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(FetchError {
                    message: "connection reset".to_string(),
                    transient: self.transient,
                });
            }
            std::fs::write(dest.join("main.tf"), self.payload).map_err(FetchError::from)
        }
    }

    fn source(uri: &str) -> SourceDescriptor {
        let mut src = SourceDescriptor::new(uri);
        src.retry.initial_backoff_ms = 1;
        src
    }

    fn workdir_in(dir: &Path) -> NormalizedPath {
        NormalizedPath::new(dir.join("workdir"))
    }

    #[test]
    fn provisions_and_writes_manifest() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let fetcher = CountingFetcher::new(0, false);
        let out = Provisioner::new()
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git?ref=v1"),
                &workdir,
                &Cancellation::new(),
            )
            .unwrap();
        assert!(!out.reused);
        assert_eq!(out.manifest.reference.as_deref(), Some("v1"));
        let dir = Path::new(workdir.as_str());
        assert!(dir.join("main.tf").is_file());
        assert!(dir.join(MANIFEST_FILE).is_file());
    }

    #[test]
    fn matching_content_skips_the_fetch() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let src = source("https://example.com/mod.git");
        let fetcher = CountingFetcher::new(0, false);
        let prov = Provisioner::new();
        let cancel = Cancellation::new();

        prov.provision_with(&fetcher, &src, &workdir, &cancel).unwrap();
        let second = prov.provision_with(&fetcher, &src, &workdir, &cancel).unwrap();

        assert!(second.reused);
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn modified_content_forces_a_refetch() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let src = source("https://example.com/mod.git");
        let fetcher = CountingFetcher::new(0, false);
        let prov = Provisioner::new();
        let cancel = Cancellation::new();

        prov.provision_with(&fetcher, &src, &workdir, &cancel).unwrap();
        std::fs::write(Path::new(workdir.as_str()).join("main.tf"), "tampered\n").unwrap();
        let second = prov.provision_with(&fetcher, &src, &workdir, &cancel).unwrap();

        assert!(!second.reused);
        assert_eq!(fetcher.calls(), 2);
        let content =
            std::fs::read_to_string(Path::new(workdir.as_str()).join("main.tf")).unwrap();
        assert_eq!(content, "module content\n");
    }

    #[test]
    fn stale_local_directory_is_replaced() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let dir = Path::new(workdir.as_str());
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("STALE_MARKER"), "local copy\n").unwrap();

        let fetcher = CountingFetcher::new(0, false);
        Provisioner::new()
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git"),
                &workdir,
                &Cancellation::new(),
            )
            .unwrap();

        assert!(!dir.join("STALE_MARKER").exists());
        assert!(dir.join("main.tf").is_file());
    }

    #[test]
    fn transient_failures_are_retried_within_budget() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let fetcher = CountingFetcher::new(2, true);
        let out = Provisioner::new()
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git"),
                &workdir,
                &Cancellation::new(),
            )
            .unwrap();
        assert!(!out.reused);
        assert_eq!(fetcher.calls(), 3);
    }

    #[test]
    fn exhausted_retries_surface_a_network_error() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let fetcher = CountingFetcher::new(10, true);
        let err = Provisioner::new()
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git"),
                &workdir,
                &Cancellation::new(),
            )
            .unwrap_err();
        match err {
            Error::FetchRetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!Path::new(workdir.as_str()).exists());
    }

    #[test]
    fn fetch_budget_caps_the_retry_loop() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let fetcher = CountingFetcher::new(10, true);
        let err = Provisioner::new()
            .with_fetch_timeout(Duration::ZERO)
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git"),
                &workdir,
                &Cancellation::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::FetchRetryExhausted { attempts: 1, .. }));
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn fatal_failures_do_not_retry() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let fetcher = CountingFetcher::new(10, false);
        let err = Provisioner::new()
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git"),
                &workdir,
                &Cancellation::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::FetchFailed { .. }));
        assert_eq!(fetcher.calls(), 1);
    }

    #[test]
    fn cancelled_run_aborts_before_fetching() {
        let root = tempfile::tempdir().unwrap();
        let workdir = workdir_in(root.path());
        let cancel = Cancellation::new();
        cancel.cancel();
        let fetcher = CountingFetcher::new(0, false);
        let err = Provisioner::new()
            .provision_with(
                &fetcher,
                &source("https://example.com/mod.git"),
                &workdir,
                &cancel,
            )
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(fetcher.calls(), 0);
    }
}
