//! Stack/component assembly
//!
//! Orchestrates one (stack, component) resolution: discover member
//! documents, expand imports, merge with deferral, evaluate functions,
//! audit for leftover placeholders, then overlay section precedence
//! (global, then the `terraform:` type scope, then the component entry)
//! into the final schema.

use serde_yaml::{Mapping, Value};
use stack_fs::{DocumentLoader, NormalizedPath};
use stack_functions::{EvalContext, Evaluator};
use stack_merge::{
    FunctionProcessor, ProcessorError, apply_deferred_merges, find_unresolved_functions,
    merge_documents_with_deferred,
};
use stack_schema::{Cancellation, FunctionCall, ResolvedComponent, Settings, SourceDescriptor};
use tracing::{debug, warn};

use crate::discovery::discover_stack_documents;
use crate::error::{Error, Result};
use crate::import::ImportResolver;

const SECTIONS: [&str; 7] = [
    "vars",
    "env",
    "settings",
    "metadata",
    "backend",
    "providers",
    "overrides",
];

/// Top-level resolution orchestrator.
pub struct Assembler<'a> {
    settings: &'a Settings,
    evaluator: &'a Evaluator,
    loader: DocumentLoader,
}

impl<'a> Assembler<'a> {
    pub fn new(settings: &'a Settings, evaluator: &'a Evaluator) -> Self {
        Self {
            settings,
            evaluator,
            loader: DocumentLoader::new(),
        }
    }

    /// Resolve one component in one stack to its final schema.
    pub fn resolve(
        &self,
        stack: &str,
        component: &str,
        cancel: &Cancellation,
    ) -> Result<ResolvedComponent> {
        let merged = self.resolve_stack(stack, component, cancel)?;
        self.emit(&merged, stack, component)
    }

    /// Run discovery, import expansion, merging and function evaluation,
    /// returning the fully resolved whole-stack mapping.
    fn resolve_stack(
        &self,
        stack: &str,
        component: &str,
        cancel: &Cancellation,
    ) -> Result<Mapping> {
        let strategy = self.settings.list_merge_strategy;

        let stack_docs =
            discover_stack_documents(&self.loader, &self.settings.stacks, stack)?;
        if stack_docs.is_empty() {
            return Err(Error::StackNotFound(stack.to_string()));
        }
        debug!(stack, files = stack_docs.len(), "discovered stack documents");

        let resolver = ImportResolver::new(
            &self.loader,
            NormalizedPath::new(&self.settings.stacks.base_path),
        );
        let ordered = resolver.resolve_all(&stack_docs)?;
        let inputs: Vec<(String, Mapping)> = ordered
            .iter()
            .map(|doc| (doc.path.as_str().to_string(), doc.data.clone()))
            .collect();

        let (mut merged, deferred) = merge_documents_with_deferred(strategy, &inputs)?;

        if component_section(&merged, component).is_none() {
            return Err(Error::ComponentNotFound {
                component: component.to_string(),
                stack: stack.to_string(),
            });
        }

        // Templates render against the structurally merged tree as it
        // stood before function results were written back.
        let template_ctx = merged.clone();
        let bound = self.evaluator.bind(EvalContext {
            stack,
            component,
            merged: &template_ctx,
            exec_timeout: self.settings.exec_timeout,
            cancel,
        });
        let processor = MissingOutputPolicy {
            inner: &bound,
            substitute_null: self.settings.skip_missing_outputs,
        };
        apply_deferred_merges(&deferred, &mut merged, strategy, Some(&processor))?;

        let leftover = find_unresolved_functions(&merged);
        if !leftover.is_empty() {
            return Err(Error::UnresolvedPlaceholders { paths: leftover });
        }
        Ok(merged)
    }

    /// Overlay section precedence and build the final schema.
    fn emit(&self, merged: &Mapping, stack: &str, component: &str) -> Result<ResolvedComponent> {
        let comp = component_section(merged, component).ok_or_else(|| Error::ComponentNotFound {
            component: component.to_string(),
            stack: stack.to_string(),
        })?;
        let type_scope = merged.get("terraform").and_then(Value::as_mapping);

        let mut out = ResolvedComponent::default();
        for section in SECTIONS {
            let layers: Vec<Mapping> = [
                merged.get(section),
                type_scope.and_then(|scope| scope.get(section)),
                comp.get(section),
            ]
            .into_iter()
            .flatten()
            .filter_map(Value::as_mapping)
            .cloned()
            .collect();
            let value = stack_merge::merge(self.settings.list_merge_strategy, &layers)?;
            match section {
                "vars" => out.vars = value,
                "env" => out.env = value,
                "settings" => out.settings = value,
                "metadata" => out.metadata = value,
                "backend" => out.backend = value,
                "providers" => out.providers = value,
                "overrides" => out.overrides = value,
                _ => unreachable!(),
            }
        }

        if let Some(source) = comp.get("source") {
            out.source = Some(serde_yaml::from_value::<SourceDescriptor>(source.clone())?);
        }
        Ok(out)
    }
}

/// Applies the configured missing-output policy around the evaluator:
/// recoverable lookups either abort or land as null with a warning.
struct MissingOutputPolicy<'a> {
    inner: &'a dyn FunctionProcessor,
    substitute_null: bool,
}

impl FunctionProcessor for MissingOutputPolicy<'_> {
    fn process(
        &self,
        call: &FunctionCall,
        key_path: &str,
    ) -> std::result::Result<Value, ProcessorError> {
        match self.inner.process(call, key_path) {
            Err(ProcessorError::Recoverable(message)) if self.substitute_null => {
                warn!(key_path, %message, "output not available, substituting null");
                Ok(Value::Null)
            }
            other => other,
        }
    }
}

fn component_section<'m>(merged: &'m Mapping, component: &str) -> Option<&'m Mapping> {
    merged
        .get("components")?
        .as_mapping()?
        .get("terraform")?
        .as_mapping()?
        .get(component)?
        .as_mapping()
}
