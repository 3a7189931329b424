//! Context value stack.
//!
//! Begin work on a provider pushes its value, complete work pops it, so
//! while a subtree renders every consumer sees the nearest provider above
//! it. Values for other contexts are untouched by the push.

use std::collections::HashMap;

use tracing::warn;

use crate::element::{Context, ContextId};
use crate::types::Value;

#[derive(Debug, Default)]
pub struct ContextStack {
    current: HashMap<ContextId, Value>,
    saved: Vec<(ContextId, Option<Value>)>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: &Context, value: Value) {
        let previous = self.current.insert(context.id(), value);
        self.saved.push((context.id(), previous));
    }

    pub fn pop(&mut self, context: &Context) {
        let Some((id, previous)) = self.saved.pop() else {
            warn!(?context, "context stack underflow");
            return;
        };
        debug_assert_eq!(id, context.id(), "unbalanced context stack");
        match previous {
            Some(value) => self.current.insert(id, value),
            None => self.current.remove(&id),
        };
    }

    /// Nearest provided value, or the context's default.
    pub fn read(&self, context: &Context) -> Value {
        self.current
            .get(&context.id())
            .cloned()
            .unwrap_or_else(|| context.default_value().clone())
    }

    pub fn depth(&self) -> usize {
        self.saved.len()
    }
}
