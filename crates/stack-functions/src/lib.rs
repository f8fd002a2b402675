//! Evaluation of deferred configuration functions.
//!
//! After merging, a component's configuration still contains deferred
//! function calls (`!terraform.output`, `!template`, `!exec`, ...). This
//! crate resolves them:
//!
//!  - [`Evaluator`] holds the external hookups: an [`OutputBackend`] for
//!    terraform outputs and state, named [`KvStore`]s, and environment
//!    overrides.
//!  - [`EvalContext`] carries the per-component state: stack, component,
//!    merged configuration (the template context), timeout, cancellation.
//!  - [`ResolutionContext`] detects cycles in cross-component output
//!    references at evaluation time.

pub mod backend;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod exec;

pub use backend::{KvStore, OutputBackend, OutputLookupError};
pub use context::{Node, ResolutionContext};
pub use error::{Error, Result};
pub use evaluator::{BoundEvaluator, EvalContext, Evaluator, split_args};
pub use exec::run_shell;
