//! Merge engine with deferred function placeholders
//!
//! Two-phase pipeline over ordered configuration documents:
//!
//! 1. [`merge_with_deferred`] scans inputs for recognized function call
//!    sites, replaces them with null placeholders, records them with their
//!    precedence rank, and performs the structural deep merge.
//! 2. [`apply_deferred_merges`] evaluates the recorded calls through a
//!    [`FunctionProcessor`] and writes the winners back per the active
//!    list-merge strategy.
//!
//! The plain [`merge`] entry point is the same engine without function
//! handling, used wherever inputs are known to be concrete.

pub mod deferred;
pub mod error;
pub mod merge;

pub use deferred::{
    DeferredContext, DeferredValue, FunctionProcessor, ProcessorError, apply_deferred_merges,
    find_unresolved_functions, get_value_at_path, merge_deferred_values,
    merge_documents_with_deferred, merge_with_deferred, set_value_at_path, walk_and_defer,
};
pub use error::{Error, Result};
pub use merge::merge;
