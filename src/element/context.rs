//! Context objects.
//!
//! A context is a typed-by-convention channel from a provider to every
//! consumer below it. Values travel as [`Value`]; the reconciler keeps the
//! current value for each context on an explicit stack while it walks the
//! tree.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Element, ElementType, Node};
use crate::types::Value;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Prop carrying a consumer's render function.
pub(crate) const CONSUMER_RENDER_PROP: &str = "render";

/// Prop carrying a provider's value.
pub(crate) const PROVIDER_VALUE_PROP: &str = "value";

/// Stable identity of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

struct ContextInner {
    id: ContextId,
    default_value: Value,
}

/// A context handle. Clones share identity.
#[derive(Clone)]
pub struct Context(Rc<ContextInner>);

impl Context {
    /// Create a context whose consumers read `default_value` when no
    /// provider is above them.
    pub fn new(default_value: impl Into<Value>) -> Self {
        let id = ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed));
        Self(Rc::new(ContextInner {
            id,
            default_value: default_value.into(),
        }))
    }

    pub fn id(&self) -> ContextId {
        self.0.id
    }

    pub fn default_value(&self) -> &Value {
        &self.0.default_value
    }

    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// `<Context.Provider value={value}>`
    pub fn provider(&self, value: impl Into<Value>) -> Element {
        Element::new(ElementType::Provider(self.clone())).prop(PROVIDER_VALUE_PROP, value)
    }

    /// `<Context.Consumer>{value => ...}</Context.Consumer>`
    pub fn consumer(&self, render: impl Fn(&Value) -> Node + 'static) -> Element {
        Element::new(ElementType::Consumer(self.clone())).prop(
            CONSUMER_RENDER_PROP,
            Value::object(ConsumerRender(Box::new(render))),
        )
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Context({})", self.0.id.0)
    }
}

/// A consumer's child render function.
pub(crate) struct ConsumerRender(Box<dyn Fn(&Value) -> Node>);

impl ConsumerRender {
    pub(crate) fn call(&self, value: &Value) -> Node {
        (self.0)(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_have_distinct_ids() {
        let a = Context::new(1);
        let b = Context::new(1);
        assert_ne!(a.id(), b.id());
        assert!(a.ptr_eq(&a.clone()));
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_provider_carries_value() {
        let ctx = Context::new("light");
        let el = ctx.provider("dark");
        assert_eq!(el.props.get(PROVIDER_VALUE_PROP), Some(&Value::from("dark")));
        assert!(matches!(el.ty, ElementType::Provider(_)));
    }

    #[test]
    fn test_consumer_render_roundtrip() {
        let ctx = Context::new(0);
        let el = ctx.consumer(|v| Node::from(v.to_text().unwrap_or_default()));
        let render = el
            .props
            .get(CONSUMER_RENDER_PROP)
            .and_then(|v| v.downcast::<ConsumerRender>())
            .expect("render prop");
        assert!(matches!(render.call(&Value::from(7)), Node::Text(t) if &*t == "7"));
    }
}
