//! Shared data model for the stack orchestrator
//!
//! Defines the types every other crate speaks: the recognized function
//! vocabulary, the resolved component schema, source descriptors, the
//! explicit settings struct, and the cancellation token.

pub mod cancel;
pub mod component;
pub mod error;
pub mod function;
pub mod settings;
pub mod source;

pub use cancel::Cancellation;
pub use component::ResolvedComponent;
pub use error::{Error, Result};
pub use function::{FUNCTION_TAGS, FunctionCall};
pub use settings::{ListMergeStrategy, Settings, StackDiscovery};
pub use source::{RetryPolicy, SourceDescriptor, WorkdirSettings};
