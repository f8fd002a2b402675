//! Deferred-function evaluation.
//!
//! The [`Evaluator`] owns the external hookups (output backend, stores,
//! environment overrides) plus the shared resolution context used for
//! cross-component cycle detection. [`Evaluator::bind`] pairs it with a
//! per-component [`EvalContext`], producing a [`BoundEvaluator`] that
//! implements [`stack_merge::FunctionProcessor`] and can be handed to the
//! deferred-merge layer.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use minijinja::Environment;
use serde_yaml::{Mapping, Value};
use stack_merge::{FunctionProcessor, ProcessorError};
use stack_schema::{Cancellation, FunctionCall};
use tracing::debug;

use crate::backend::{KvStore, OutputBackend, OutputLookupError};
use crate::context::{Node, ResolutionContext};
use crate::error::{Error, Result};
use crate::exec::run_shell;

/// Per-component evaluation state.
pub struct EvalContext<'a> {
    /// Stack the component is being resolved in.
    pub stack: &'a str,
    /// Component name.
    pub component: &'a str,
    /// The merged configuration, used as the template rendering context.
    pub merged: &'a Mapping,
    /// Timeout applied to `!exec` commands.
    pub exec_timeout: Duration,
    /// Cooperative cancellation token.
    pub cancel: &'a Cancellation,
}

/// Evaluates configuration functions against external systems.
#[derive(Default)]
pub struct Evaluator {
    backend: Option<Box<dyn OutputBackend>>,
    stores: HashMap<String, Box<dyn KvStore>>,
    env_overrides: HashMap<String, String>,
    resolution: RefCell<ResolutionContext>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Box<dyn OutputBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_store(mut self, name: impl Into<String>, store: Box<dyn KvStore>) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Override an environment variable for `!env` lookups. Overrides
    /// take priority over the process environment.
    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_overrides.insert(name.into(), value.into());
        self
    }

    /// Bind to a component under resolution, producing a processor the
    /// deferred-merge layer can call.
    pub fn bind<'a>(&'a self, ctx: EvalContext<'a>) -> BoundEvaluator<'a> {
        BoundEvaluator { eval: self, ctx }
    }

    /// Evaluate a single function call in the given context.
    pub fn evaluate(&self, call: &FunctionCall, ctx: &EvalContext<'_>) -> Result<Value> {
        if ctx.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match call {
            FunctionCall::Template(args) => self.eval_template(args, ctx),
            FunctionCall::TerraformOutput(args) => self.eval_terraform(call, args, ctx, false),
            FunctionCall::TerraformState(args) => self.eval_terraform(call, args, ctx, true),
            FunctionCall::Store(args) | FunctionCall::StoreGet(args) => {
                self.eval_store(call, args)
            }
            FunctionCall::Exec(command) => self.eval_exec(command, ctx),
            FunctionCall::Env(args) => self.eval_env(call, args),
        }
    }

    fn eval_template(&self, template: &str, ctx: &EvalContext<'_>) -> Result<Value> {
        let env = Environment::new();
        let rendered = env.render_str(
            template,
            minijinja::Value::from_serialize(ctx.merged),
        )?;
        Ok(parse_scalar(&rendered))
    }

    fn eval_terraform(
        &self,
        call: &FunctionCall,
        args: &str,
        ctx: &EvalContext<'_>,
        state: bool,
    ) -> Result<Value> {
        let tokens = split_args(args);
        let (component, stack, name) = match tokens.as_slice() {
            [component, name] => (component.as_str(), ctx.stack, name.as_str()),
            [component, stack, name] => (component.as_str(), stack.as_str(), name.as_str()),
            _ => {
                return Err(Error::UnknownFunction {
                    call: call.to_string(),
                    reason: "expected 2 or 3 arguments".to_string(),
                })
            }
        };

        let backend = self.backend.as_ref().ok_or_else(|| {
            Error::Backend("no output backend configured".to_string())
        })?;

        self.resolution
            .borrow_mut()
            .push(Node::new(stack, component, &call.to_string()))?;
        let result = if state {
            backend.state(component, stack, name)
        } else {
            backend.output(component, stack, name)
        };
        self.resolution.borrow_mut().pop();

        let value = result.map_err(|err| match err {
            OutputLookupError::NotAvailable => Error::OutputNotAvailable {
                component: component.to_string(),
                stack: stack.to_string(),
                output: name.to_string(),
            },
            OutputLookupError::Query(message) => Error::Backend(message),
        })?;

        Ok(match value {
            Value::String(s) => Value::String(unescape_once(&s)),
            other => other,
        })
    }

    fn eval_store(&self, call: &FunctionCall, args: &str) -> Result<Value> {
        let tokens = split_args(args);
        let [store_name, key] = tokens.as_slice() else {
            return Err(Error::UnknownFunction {
                call: call.to_string(),
                reason: "expected 2 arguments: store name and key".to_string(),
            });
        };
        let store = self
            .stores
            .get(store_name.as_str())
            .ok_or_else(|| Error::UnknownStore(store_name.clone()))?;
        match store.get(key).map_err(Error::Backend)? {
            Some(value) => Ok(value),
            None => Err(Error::StoreKeyNotFound {
                store: store_name.clone(),
                key: key.clone(),
            }),
        }
    }

    fn eval_exec(&self, command: &str, ctx: &EvalContext<'_>) -> Result<Value> {
        let stdout = run_shell(command, ctx.exec_timeout, ctx.cancel)?;
        Ok(parse_scalar(&stdout))
    }

    fn eval_env(&self, call: &FunctionCall, args: &str) -> Result<Value> {
        let tokens = split_args(args);
        let (name, default) = match tokens.as_slice() {
            [name] => (name.as_str(), None),
            [name, default] => (name.as_str(), Some(default.as_str())),
            _ => {
                return Err(Error::UnknownFunction {
                    call: call.to_string(),
                    reason: "expected 1 or 2 arguments".to_string(),
                })
            }
        };
        if let Some(value) = self.env_overrides.get(name) {
            return Ok(Value::String(value.clone()));
        }
        match std::env::var(name) {
            Ok(value) => Ok(Value::String(value)),
            Err(_) => match default {
                Some(d) => Ok(Value::String(d.to_string())),
                None => Err(Error::EnvNotSet(name.to_string())),
            },
        }
    }
}

/// An [`Evaluator`] bound to one component's [`EvalContext`].
pub struct BoundEvaluator<'a> {
    eval: &'a Evaluator,
    ctx: EvalContext<'a>,
}

impl FunctionProcessor for BoundEvaluator<'_> {
    fn process(
        &self,
        call: &FunctionCall,
        key_path: &str,
    ) -> std::result::Result<Value, ProcessorError> {
        debug!(%call, key_path, "evaluating function");
        self.eval.evaluate(call, &self.ctx).map_err(|err| {
            if err.is_recoverable() {
                ProcessorError::Recoverable(err.to_string())
            } else {
                ProcessorError::Fatal(err.to_string())
            }
        })
    }
}

/// Split a function argument string on whitespace, honoring single and
/// double quotes so quoted arguments may contain spaces.
pub fn split_args(args: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut has_token = false;

    for ch in args.chars() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => current.push(ch),
            None => match ch {
                '\'' | '"' => {
                    quote = Some(ch);
                    has_token = true;
                }
                c if c.is_whitespace() => {
                    if has_token {
                        tokens.push(std::mem::take(&mut current));
                        has_token = false;
                    }
                }
                c => {
                    current.push(c);
                    has_token = true;
                }
            },
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

/// Parse command/template output as a YAML scalar where possible,
/// falling back to the raw string. Multi-line text stays a string.
fn parse_scalar(text: &str) -> Value {
    if text.is_empty() {
        return Value::String(String::new());
    }
    if text.contains('\n') {
        return Value::String(text.to_string());
    }
    match serde_yaml::from_str::<Value>(text) {
        Ok(value @ (Value::Bool(_) | Value::Number(_) | Value::Null)) => value,
        Ok(value @ (Value::Sequence(_) | Value::Mapping(_))) => value,
        _ => Value::String(text.to_string()),
    }
}

/// Undo one level of backslash escaping. Backend transports deliver
/// multiline strings with literal `\n` sequences; this restores them.
fn unescape_once(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}
