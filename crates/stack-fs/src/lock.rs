//! Per-path lock table
//!
//! Serializes access to shared filesystem resources (provisioned working
//! directories) across threads of this process and, via advisory file
//! locks, across processes. Locks are keyed by normalized path so two
//! spellings of the same directory contend on the same entry.

use crate::{Error, NormalizedPath, Result};
use fs2::FileExt;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::sync::{Condvar, Mutex};

/// Table of path-keyed exclusive locks.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<NormalizedPath>>,
    released: Condvar,
}

/// Guard holding both the in-process lock and the on-disk advisory lock.
///
/// Dropping the guard releases both.
pub struct PathLockGuard<'a> {
    table: &'a LockTable,
    path: NormalizedPath,
    lock_file: Option<File>,
}

impl Drop for PathLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.lock_file.take() {
            let _ = fs2::FileExt::unlock(&file);
        }
        let mut held = self
            .table
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        held.remove(&self.path);
        self.table.released.notify_all();
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire an exclusive lock for `path`, blocking until available.
    ///
    /// The lock file is created next to the target as `.<name>.lock` so the
    /// target itself can be atomically replaced while locked.
    pub fn lock(&self, path: &NormalizedPath) -> Result<PathLockGuard<'_>> {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        while held.contains(path) {
            held = self
                .released
                .wait(held)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        held.insert(path.clone());
        drop(held);

        let lock_path = lock_file_path(path);
        if let Some(parent) = lock_path.to_native().parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path.to_native())
            .map_err(|e| Error::io(lock_path.to_native(), e))?;
        lock_file.lock_exclusive().map_err(|_| Error::LockFailed {
            path: path.to_native(),
        })?;

        Ok(PathLockGuard {
            table: self,
            path: path.clone(),
            lock_file: Some(lock_file),
        })
    }
}

fn lock_file_path(path: &NormalizedPath) -> NormalizedPath {
    let name = path.file_name().unwrap_or("path");
    match path.parent() {
        Some(parent) => parent.join(&format!(".{name}.lock")),
        None => NormalizedPath::new(format!(".{name}.lock")),
    }
}
