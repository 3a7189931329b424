//! Component descriptors.
//!
//! A descriptor is created once and shared by every element that renders it.
//! Reuse across renders depends on descriptor identity, so build descriptors
//! outside render bodies.

use std::rc::Rc;

use super::{Context, Element, ElementType, Node, Props};
use crate::hooks::Hooks;
use crate::types::Value;

// =============================================================================
// Function components
// =============================================================================

type RenderFn = dyn Fn(&Props, &mut Hooks<'_>) -> Node;

struct FunctionDef {
    name: Rc<str>,
    render: Box<RenderFn>,
}

/// A function-style component.
///
/// The render function receives the element's props and the hooks render
/// context for this call.
///
/// ```ignore
/// let counter = FunctionComponent::new("Counter", |_props, hooks| {
///     let (count, set_count) = hooks.use_state(|| 0i64);
///     Element::host("button")
///         .on("click", move || set_count.dispatch(count + 1))
///         .child(count)
///         .into()
/// });
/// ```
#[derive(Clone)]
pub struct FunctionComponent(Rc<FunctionDef>);

impl FunctionComponent {
    pub fn new(
        name: &str,
        render: impl Fn(&Props, &mut Hooks<'_>) -> Node + 'static,
    ) -> Self {
        Self(Rc::new(FunctionDef {
            name: Rc::from(name),
            render: Box::new(render),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn ptr_eq(&self, other: &FunctionComponent) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn render(&self, props: &Props, hooks: &mut Hooks<'_>) -> Node {
        (self.0.render)(props, hooks)
    }

    /// Start an element of this component type.
    pub fn element(&self) -> Element {
        Element::new(ElementType::Function(self.clone()))
    }
}

// =============================================================================
// Class components
// =============================================================================

/// An instance-style component.
///
/// The instance is constructed once when the node mounts and lives in the
/// node's host-tree handle slot until the node is deleted.
pub trait ClassComponent {
    /// Produce the child description for the current props and context.
    fn render(&mut self, props: &Props, context: Option<&Value>) -> Node;

    /// Called during commit when the instance's node is deleted.
    fn component_will_unmount(&mut self) {}
}

type Constructor = dyn Fn(&Props) -> Box<dyn ClassComponent>;

struct ClassInner {
    name: Rc<str>,
    context_type: Option<Context>,
    construct: Box<Constructor>,
}

/// Descriptor for a class-style component.
#[derive(Clone)]
pub struct ClassDef(Rc<ClassInner>);

impl ClassDef {
    pub fn new(
        name: &str,
        construct: impl Fn(&Props) -> Box<dyn ClassComponent> + 'static,
    ) -> Self {
        Self(Rc::new(ClassInner {
            name: Rc::from(name),
            context_type: None,
            construct: Box::new(construct),
        }))
    }

    /// Same as [`ClassDef::new`], reading `context` on every render.
    pub fn with_context(
        name: &str,
        context: Context,
        construct: impl Fn(&Props) -> Box<dyn ClassComponent> + 'static,
    ) -> Self {
        Self(Rc::new(ClassInner {
            name: Rc::from(name),
            context_type: Some(context),
            construct: Box::new(construct),
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn context_type(&self) -> Option<&Context> {
        self.0.context_type.as_ref()
    }

    pub fn ptr_eq(&self, other: &ClassDef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn construct(&self, props: &Props) -> Box<dyn ClassComponent> {
        (self.0.construct)(props)
    }

    pub fn element(&self) -> Element {
        Element::new(ElementType::Class(self.clone()))
    }
}
