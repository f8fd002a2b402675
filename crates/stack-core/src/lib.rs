//! Stack resolution orchestration.
//!
//! Ties the lower layers together for one (stack, component) request:
//!
//!  1. [`discover_stack_documents`] finds the member configuration files.
//!  2. [`ImportResolver`] expands `import:` directives depth-first with
//!     cycle detection; output order is merge precedence.
//!  3. `stack-merge` merges the ordered documents, deferring function
//!     calls; `stack-functions` evaluates them against the merged tree.
//!  4. [`Assembler`] overlays section precedence and emits the final
//!     [`stack_schema::ResolvedComponent`].

pub mod assembler;
pub mod discovery;
pub mod error;
pub mod import;

pub use assembler::Assembler;
pub use discovery::discover_stack_documents;
pub use error::{Error, Result};
pub use import::{ImportEntry, ImportResolver, parse_imports};
