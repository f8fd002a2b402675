//! SHA-256 tree checksums
//!
//! A single canonical checksum format (`sha256:<hex>`) is used for the
//! provisioner's content-match idempotence checks.

use sha2::{Digest, Sha256};
use std::path::Path;

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute a checksum over an entire directory tree.
///
/// Hashes each regular file's relative path and contents, visiting entries
/// in sorted order so the result is independent of directory iteration
/// order. Symlinks and empty directories do not contribute.
pub fn compute_tree_checksum(root: &Path) -> std::io::Result<String> {
    compute_tree_checksum_excluding(root, &[])
}

/// Like [`compute_tree_checksum`], skipping entries whose file name is in
/// `exclude`. The provisioner excludes its own manifest so the recorded
/// checksum stays stable across provision/check cycles.
pub fn compute_tree_checksum_excluding(
    root: &Path,
    exclude: &[&str],
) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    hash_dir(root, root, exclude, &mut hasher)?;
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

fn hash_dir(
    root: &Path,
    dir: &Path,
    exclude: &[&str],
    hasher: &mut Sha256,
) -> std::io::Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .collect::<std::io::Result<Vec<_>>>()?
        .into_iter()
        .map(|e| e.path())
        .filter(|p| {
            !p.file_name()
                .is_some_and(|name| exclude.iter().any(|ex| name == *ex))
        })
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            hash_dir(root, &path, exclude, hasher)?;
        } else if path.is_file() {
            let rel = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            hasher.update(rel.as_bytes());
            hasher.update([0u8]);
            hasher.update(std::fs::read(&path)?);
            hasher.update([0u8]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_checksum_is_order_independent_and_content_sensitive() {
        let a = tempfile::tempdir().unwrap();
        std::fs::create_dir(a.path().join("sub")).unwrap();
        std::fs::write(a.path().join("main.tf"), "module").unwrap();
        std::fs::write(a.path().join("sub/vars.tf"), "vars").unwrap();

        let b = tempfile::tempdir().unwrap();
        std::fs::create_dir(b.path().join("sub")).unwrap();
        std::fs::write(b.path().join("sub/vars.tf"), "vars").unwrap();
        std::fs::write(b.path().join("main.tf"), "module").unwrap();

        assert_eq!(
            compute_tree_checksum(a.path()).unwrap(),
            compute_tree_checksum(b.path()).unwrap()
        );

        std::fs::write(b.path().join("main.tf"), "changed").unwrap();
        assert_ne!(
            compute_tree_checksum(a.path()).unwrap(),
            compute_tree_checksum(b.path()).unwrap()
        );
    }

    #[test]
    fn tree_checksum_distinguishes_file_layout() {
        let a = tempfile::tempdir().unwrap();
        std::fs::write(a.path().join("x"), "ab").unwrap();

        let b = tempfile::tempdir().unwrap();
        std::fs::write(b.path().join("xa"), "b").unwrap();

        assert_ne!(
            compute_tree_checksum(a.path()).unwrap(),
            compute_tree_checksum(b.path()).unwrap()
        );
    }

    #[test]
    fn excluded_file_names_do_not_contribute() {
        let a = tempfile::tempdir().unwrap();
        std::fs::write(a.path().join("main.tf"), "module").unwrap();

        let b = tempfile::tempdir().unwrap();
        std::fs::write(b.path().join("main.tf"), "module").unwrap();
        std::fs::write(b.path().join(".meta.json"), "{}").unwrap();

        assert_eq!(
            compute_tree_checksum(a.path()).unwrap(),
            compute_tree_checksum_excluding(b.path(), &[".meta.json"]).unwrap()
        );
        assert_ne!(
            compute_tree_checksum(a.path()).unwrap(),
            compute_tree_checksum(b.path()).unwrap()
        );
    }
}
