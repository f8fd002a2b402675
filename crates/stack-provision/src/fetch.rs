//! Source fetchers
//!
//! A fetcher materializes one source tree into an empty destination
//! directory. Git URIs are cloned with git2 and stripped of their `.git`
//! directory; local paths are copied. Fetch failures carry a transient
//! flag that drives the retry loop.

use std::path::{Path, PathBuf};

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::ErrorClass;
use tracing::debug;

/// A failed fetch attempt.
#[derive(Debug)]
pub struct FetchError {
    pub message: String,
    /// Whether retrying could plausibly succeed (network-class errors).
    pub transient: bool,
}

impl FetchError {
    fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: false,
        }
    }
}

impl From<git2::Error> for FetchError {
    fn from(err: git2::Error) -> Self {
        let transient = matches!(
            err.class(),
            ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh | ErrorClass::Os
        );
        Self {
            message: err.message().to_string(),
            transient,
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(err: std::io::Error) -> Self {
        Self {
            message: err.to_string(),
            transient: false,
        }
    }
}

/// Materializes a source tree into a destination directory.
pub trait Fetcher {
    fn fetch(
        &self,
        uri: &str,
        reference: Option<&str>,
        dest: &Path,
    ) -> Result<(), FetchError>;
}

/// Clones a git repository, detaches at the requested ref, and removes
/// the `.git` directory so the result is a plain source tree.
pub struct GitFetcher;

impl Fetcher for GitFetcher {
    fn fetch(
        &self,
        uri: &str,
        reference: Option<&str>,
        dest: &Path,
    ) -> Result<(), FetchError> {
        debug!(uri, ?reference, dest = %dest.display(), "cloning git source");
        let repo = RepoBuilder::new().clone(uri, dest)?;
        if let Some(reference) = reference {
            let object = repo.revparse_single(reference).map_err(|err| {
                // An unknown ref will never resolve on retry.
                FetchError::fatal(format!("ref '{reference}' not found: {}", err.message()))
            })?;
            repo.checkout_tree(&object, Some(CheckoutBuilder::new().force()))?;
            repo.set_head_detached(object.id())?;
        }
        drop(repo);
        std::fs::remove_dir_all(dest.join(".git"))?;
        Ok(())
    }
}

/// Copies a local directory tree. Used for filesystem sources and in
/// tests; never transient.
pub struct LocalFetcher;

impl Fetcher for LocalFetcher {
    fn fetch(
        &self,
        uri: &str,
        _reference: Option<&str>,
        dest: &Path,
    ) -> Result<(), FetchError> {
        let src = PathBuf::from(strip_scheme(uri));
        if !src.is_dir() {
            return Err(FetchError::fatal(format!(
                "source path '{}' does not exist",
                src.display()
            )));
        }
        debug!(src = %src.display(), dest = %dest.display(), "copying local source");
        copy_dir(&src, dest)?;
        Ok(())
    }
}

/// Pick a fetcher for a URI: local paths and `file://` copy, everything
/// else is treated as a git source.
pub fn fetcher_for(uri: &str) -> Box<dyn Fetcher> {
    let stripped = strip_scheme(uri);
    if stripped.starts_with('/')
        || stripped.starts_with("./")
        || stripped.starts_with("../")
        || Path::new(stripped).is_dir()
    {
        Box::new(LocalFetcher)
    } else {
        Box::new(GitFetcher)
    }
}

fn strip_scheme(uri: &str) -> &str {
    uri.strip_prefix("git::")
        .or_else(|| uri.strip_prefix("file://"))
        .unwrap_or(uri)
}

fn copy_dir(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dest.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_fetch_copies_the_tree() {
        let src = tempfile::tempdir().unwrap();
        std::fs::write(src.path().join("main.tf"), "resource {}\n").unwrap();
        std::fs::create_dir(src.path().join("modules")).unwrap();
        std::fs::write(src.path().join("modules/sub.tf"), "module\n").unwrap();

        let dest = tempfile::tempdir().unwrap();
        LocalFetcher
            .fetch(src.path().to_str().unwrap(), None, dest.path())
            .unwrap();
        assert!(dest.path().join("main.tf").is_file());
        assert!(dest.path().join("modules/sub.tf").is_file());
    }

    #[test]
    fn missing_local_source_is_fatal() {
        let dest = tempfile::tempdir().unwrap();
        let err = LocalFetcher
            .fetch("/definitely/not/a/real/path", None, dest.path())
            .unwrap_err();
        assert!(!err.transient);
    }

    #[test]
    fn local_paths_select_the_local_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        let uri = format!("file://{}", dir.path().display());
        // Will copy an empty tree, proving the local fetcher was picked.
        let dest = tempfile::tempdir().unwrap();
        fetcher_for(&uri).fetch(&uri, None, dest.path()).unwrap();
    }
}
