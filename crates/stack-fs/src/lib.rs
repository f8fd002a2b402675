//! Filesystem layer for the stack orchestrator
//!
//! Provides normalized path handling, atomic I/O, checksums, a per-path
//! lock table, and the configuration document loader.

pub mod checksum;
pub mod error;
pub mod io;
pub mod loader;
pub mod lock;
pub mod path;

pub use error::{Error, Result};
pub use loader::{Document, DocumentLoader, glob_paths};
pub use lock::{LockTable, PathLockGuard};
pub use path::NormalizedPath;
