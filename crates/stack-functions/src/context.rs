//! Cross-component resolution context
//!
//! Tracks the chain of in-flight cross-component lookups so that a
//! component whose output reference leads, transitively, back to itself is
//! rejected with the full dependency chain. This cycle check is separate
//! from the import resolver's: it fires at evaluation time, over the
//! function-dependency graph.

use crate::{Error, Result};
use std::collections::HashSet;

/// One frame in the lookup chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Unique key, `<stack>/<component>`.
    pub key: String,
    /// Human-readable label for error messages.
    pub label: String,
    /// The call that opened this frame.
    pub call_info: String,
}

impl Node {
    pub fn new(stack: &str, component: &str, call_info: impl Into<String>) -> Self {
        Self {
            key: format!("{stack}/{component}"),
            label: format!("component '{component}' in stack '{stack}'"),
            call_info: call_info.into(),
        }
    }
}

/// DFS call stack with membership index.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    call_stack: Vec<Node>,
    visited: HashSet<String>,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a lookup frame; fails if the node is already on the stack.
    pub fn push(&mut self, node: Node) -> Result<()> {
        if self.visited.contains(&node.key) {
            let mut cycle: Vec<String> =
                self.call_stack.iter().map(|n| n.label.clone()).collect();
            cycle.push(node.label.clone());
            return Err(Error::CyclicFunctionDependency { cycle });
        }
        self.visited.insert(node.key.clone());
        self.call_stack.push(node);
        Ok(())
    }

    /// Leave the most recent frame.
    pub fn pop(&mut self) {
        if let Some(node) = self.call_stack.pop() {
            self.visited.remove(&node.key);
        }
    }

    pub fn len(&self) -> usize {
        self.call_stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.call_stack.is_empty()
    }
}
