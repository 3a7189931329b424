//! Description model - what components return and what the reconciler diffs.
//!
//! A description tree is immutable and cheap to clone: props live behind an
//! `Rc`, component types are shared descriptors compared by identity.
//!
//! ```text
//! Node::Element(div)
//!   ├─ Node::Text("count: ")
//!   └─ Node::List([li key=a, li key=b])
//! ```
//!
//! Descriptions are cheap to build and never mutated after construction.

mod component;
mod context;

pub use component::*;
pub use context::*;

use std::rc::Rc;

use crate::types::{Callback, Key, Value};

// =============================================================================
// Node
// =============================================================================

/// A child description.
#[derive(Clone, Default)]
pub enum Node {
    /// Renders nothing (`null`, `false`, `undefined`).
    #[default]
    Empty,
    /// A text leaf. Empty strings render nothing.
    Text(Rc<str>),
    /// A typed element.
    Element(Element),
    /// An ordered child list. Nested lists become implicit fragments.
    List(Vec<Node>),
}

impl Node {
    pub fn text(content: impl Into<Rc<str>>) -> Self {
        Node::Text(content.into())
    }

    pub fn list(children: impl IntoIterator<Item = Node>) -> Self {
        Node::List(children.into_iter().collect())
    }

    /// True for text that produces a text node.
    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(s) if !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Node::Empty => true,
            Node::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Empty => f.write_str("Empty"),
            Node::Text(s) => write!(f, "Text({s:?})"),
            Node::Element(el) => write!(f, "<{}{}>", el.ty.name(), match &el.key {
                Some(key) => format!(" key={key}"),
                None => String::new(),
            }),
            Node::List(items) => f.debug_list().entries(items).finish(),
        }
    }
}

impl From<Element> for Node {
    fn from(el: Element) -> Self {
        Node::Element(el)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(Rc::from(s))
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(Rc::from(s))
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Text(Rc::from(n.to_string()))
    }
}

impl From<i32> for Node {
    fn from(n: i32) -> Self {
        Node::Text(Rc::from(n.to_string()))
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::List(items)
    }
}

impl<T: Into<Node>> From<Option<T>> for Node {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Node::Empty)
    }
}

// =============================================================================
// Props
// =============================================================================

#[derive(Clone, Default)]
struct PropsData {
    attributes: Vec<(Rc<str>, Value)>,
    children: Node,
}

/// Element props: named attributes plus a `children` description.
///
/// Cloning shares the allocation; [`Props::ptr_eq`] answers "same props
/// object" the way the host update path needs.
#[derive(Clone, Default)]
pub struct Props(Rc<PropsData>);

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    /// Props that only carry children.
    pub fn with_children(children: Node) -> Self {
        Props(Rc::new(PropsData {
            attributes: Vec::new(),
            children,
        }))
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .attributes
            .iter()
            .find(|(k, _)| &**k == name)
            .map(|(_, v)| v)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.attributes.iter().map(|(k, v)| (&**k, v))
    }

    pub fn children(&self) -> &Node {
        &self.0.children
    }

    pub fn ptr_eq(&self, other: &Props) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn set(&mut self, name: &str, value: Value) {
        let data = Rc::make_mut(&mut self.0);
        match data.attributes.iter_mut().find(|(k, _)| &**k == name) {
            Some(slot) => slot.1 = value,
            None => data.attributes.push((Rc::from(name), value)),
        }
    }

    fn set_children(&mut self, children: Node) {
        Rc::make_mut(&mut self.0).children = children;
    }
}

impl std::fmt::Debug for Props {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Props")
            .field("attributes", &self.0.attributes)
            .field("children", &self.0.children)
            .finish()
    }
}

// =============================================================================
// Element
// =============================================================================

/// A typed element description.
#[derive(Clone, Debug)]
pub struct Element {
    pub ty: ElementType,
    pub key: Option<Key>,
    pub props: Props,
}

impl Element {
    pub fn new(ty: ElementType) -> Self {
        Self {
            ty,
            key: None,
            props: Props::new(),
        }
    }

    /// A host element (`div`, `span`, ...).
    pub fn host(tag: &str) -> Self {
        Self::new(ElementType::Host(Rc::from(tag)))
    }

    pub fn fragment(children: impl Into<Node>) -> Self {
        Self::new(ElementType::Fragment).child(children)
    }

    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.props.set(name, value.into());
        self
    }

    /// Register an event listener prop (`on` + capitalised event name).
    pub fn on(self, event: &str, callback: impl Into<Callback>) -> Self {
        let name = event_prop_name(event);
        self.prop(&name, Value::Callback(callback.into()))
    }

    /// Replace the children description.
    pub fn child(mut self, children: impl Into<Node>) -> Self {
        self.props.set_children(children.into());
        self
    }

    pub fn children(self, children: impl IntoIterator<Item = Node>) -> Self {
        self.child(Node::list(children))
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }
}

// =============================================================================
// ElementType
// =============================================================================

/// The resolved type of an element.
#[derive(Clone)]
pub enum ElementType {
    /// Native host element, by tag name.
    Host(Rc<str>),
    Function(FunctionComponent),
    Class(ClassDef),
    Fragment,
    Provider(Context),
    Consumer(Context),
}

impl ElementType {
    /// Type identity used for node reuse.
    ///
    /// Host tags compare by name, components by descriptor identity,
    /// providers and consumers by context identity.
    pub fn same_type(&self, other: &ElementType) -> bool {
        match (self, other) {
            (ElementType::Host(a), ElementType::Host(b)) => a == b,
            (ElementType::Function(a), ElementType::Function(b)) => a.ptr_eq(b),
            (ElementType::Class(a), ElementType::Class(b)) => a.ptr_eq(b),
            (ElementType::Fragment, ElementType::Fragment) => true,
            (ElementType::Provider(a), ElementType::Provider(b)) => a.ptr_eq(b),
            (ElementType::Consumer(a), ElementType::Consumer(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ElementType::Host(tag) => tag,
            ElementType::Function(f) => f.name(),
            ElementType::Class(c) => c.name(),
            ElementType::Fragment => "Fragment",
            ElementType::Provider(_) => "Context.Provider",
            ElementType::Consumer(_) => "Context.Consumer",
        }
    }
}

impl std::fmt::Debug for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// `click` -> `onClick`.
pub fn event_prop_name(event: &str) -> String {
    let mut chars = event.chars();
    match chars.next() {
        Some(first) => format!("on{}{}", first.to_uppercase(), chars.as_str()),
        None => "on".to_string(),
    }
}

/// `onClick` -> `Some("click")`; anything else -> `None`.
pub fn event_name_of(prop: &str) -> Option<String> {
    let rest = prop.strip_prefix("on")?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_uppercase() {
        return None;
    }
    Some(format!("{}{}", first.to_lowercase(), chars.as_str()))
}
