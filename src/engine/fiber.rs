//! The work node ("fiber") and its constructors.
//!
//! Every node exists in up to two generations: the committed one on screen
//! and the work-in-progress one being built. The two point at each other
//! through `alternate`, and [`create_work_in_progress`] recycles the older
//! generation instead of allocating.
//!
//! ```text
//!   current (committed)          work-in-progress
//!   HostRoot ◄────alternate────► HostRoot
//!     │ child                      │ child
//!     ▼                            ▼
//!   App ──sibling──► Footer      App' ──sibling──► Footer'
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::{FiberArena, FiberId, Flags, Lanes, RootId};
use crate::element::{ClassComponent, Element, ElementType, Node, Props};
use crate::hooks::{Effect, HookSlot};
use crate::host::HostNode;
use crate::types::{Callback, Key, Value};

// =============================================================================
// WorkTag
// =============================================================================

/// What kind of node this is; decides begin/complete/commit behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkTag {
    FunctionComponent,
    ClassComponent,
    HostRoot,
    HostComponent,
    HostText,
    Fragment,
    ContextProvider,
    ContextConsumer,
}

impl WorkTag {
    pub fn of(ty: &ElementType) -> WorkTag {
        match ty {
            ElementType::Host(_) => WorkTag::HostComponent,
            ElementType::Function(_) => WorkTag::FunctionComponent,
            ElementType::Class(_) => WorkTag::ClassComponent,
            ElementType::Fragment => WorkTag::Fragment,
            ElementType::Provider(_) => WorkTag::ContextProvider,
            ElementType::Consumer(_) => WorkTag::ContextConsumer,
        }
    }

    /// Nodes that own a native node of their own.
    pub fn is_host(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostText)
    }

    /// Nodes whose native node can contain children.
    pub fn is_host_parent(self) -> bool {
        matches!(self, WorkTag::HostComponent | WorkTag::HostRoot)
    }
}

// =============================================================================
// Payload enums
// =============================================================================

/// Props a node was rendered with.
#[derive(Debug, Clone, Default)]
pub enum FiberProps {
    #[default]
    Empty,
    Element(Props),
    Text(Rc<str>),
}

impl FiberProps {
    pub fn as_props(&self) -> Option<&Props> {
        match self {
            FiberProps::Element(props) => Some(props),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FiberProps::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Shared handle to a class component instance.
pub type ClassInstance = Rc<RefCell<Box<dyn ClassComponent>>>;

/// The node's handle slot.
#[derive(Clone, Default)]
pub enum StateNode {
    #[default]
    None,
    /// Native node of a host element or text.
    Host(HostNode),
    /// Class component instance.
    Instance(ClassInstance),
    /// Back-reference from a root node to its root record.
    Root(RootId),
}

impl StateNode {
    pub fn host(&self) -> Option<HostNode> {
        match self {
            StateNode::Host(node) => Some(*node),
            _ => None,
        }
    }
}

impl std::fmt::Debug for StateNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateNode::None => f.write_str("None"),
            StateNode::Host(node) => write!(f, "Host({node:?})"),
            StateNode::Instance(_) => f.write_str("Instance"),
            StateNode::Root(id) => write!(f, "Root({id:?})"),
        }
    }
}

/// Memoized state, by tag.
#[derive(Clone, Default)]
pub enum MemoizedState {
    #[default]
    None,
    /// HostRoot: the element last rendered into the root.
    Root(Node),
    /// FunctionComponent: the ordered hook chain.
    Hooks(Vec<HookSlot>),
}

impl MemoizedState {
    pub fn hooks(&self) -> Option<&Vec<HookSlot>> {
        match self {
            MemoizedState::Hooks(chain) => Some(chain),
            _ => None,
        }
    }
}

/// One change a host element needs at commit.
#[derive(Debug, Clone, PartialEq)]
pub enum PropChange {
    Set(Rc<str>, Value),
    Remove(Rc<str>),
    AddListener(String, Callback),
    RemoveListener(String),
    /// Direct text content; `None` clears it.
    Text(Option<Rc<str>>),
}

// =============================================================================
// Fiber
// =============================================================================

/// A unit of work and a node of the render tree.
pub struct Fiber {
    pub tag: WorkTag,
    pub key: Option<Key>,
    pub element_type: Option<ElementType>,
    pub state_node: StateNode,

    pub return_fiber: Option<FiberId>,
    pub child: Option<FiberId>,
    pub sibling: Option<FiberId>,
    /// Position among siblings, including skipped empty slots.
    pub index: usize,

    pub pending_props: FiberProps,
    pub memoized_props: Option<FiberProps>,
    pub memoized_state: MemoizedState,
    /// Effect records of a function component, in declaration order.
    pub effects: Vec<Rc<Effect>>,
    /// Host changes computed during complete.
    pub update_payload: Vec<PropChange>,

    pub flags: Flags,
    pub deletions: Vec<FiberId>,
    pub lanes: Lanes,
    pub child_lanes: Lanes,

    pub alternate: Option<FiberId>,
}

impl Fiber {
    pub fn new(tag: WorkTag, pending_props: FiberProps, key: Option<Key>) -> Self {
        Self {
            tag,
            key,
            element_type: None,
            state_node: StateNode::None,
            return_fiber: None,
            child: None,
            sibling: None,
            index: 0,
            pending_props,
            memoized_props: None,
            memoized_state: MemoizedState::None,
            effects: Vec::new(),
            update_payload: Vec::new(),
            flags: Flags::empty(),
            deletions: Vec::new(),
            lanes: Lanes::empty(),
            child_lanes: Lanes::empty(),
            alternate: None,
        }
    }

    pub fn props(&self) -> Option<&Props> {
        self.pending_props.as_props()
    }
}

impl std::fmt::Debug for Fiber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fiber")
            .field("tag", &self.tag)
            .field("type", &self.element_type)
            .field("key", &self.key)
            .field("index", &self.index)
            .field("flags", &self.flags)
            .finish()
    }
}

// =============================================================================
// Constructors
// =============================================================================

/// Derive (or recycle) the work-in-progress counterpart of `current`.
///
/// The counterpart keeps its host handle and hook state; flags and
/// deletions are reset so nothing leaks from the render two generations ago.
pub fn create_work_in_progress(
    arena: &mut FiberArena,
    current: FiberId,
    pending_props: FiberProps,
) -> FiberId {
    let wip = match arena[current].alternate {
        Some(wip) => {
            let ty = arena[current].element_type.clone();
            let fiber = &mut arena[wip];
            fiber.pending_props = pending_props;
            fiber.element_type = ty;
            fiber.flags = Flags::empty();
            fiber.deletions.clear();
            fiber.update_payload.clear();
            wip
        }
        None => {
            let src = &arena[current];
            let mut fiber = Fiber::new(src.tag, pending_props, src.key.clone());
            fiber.element_type = src.element_type.clone();
            fiber.state_node = src.state_node.clone();
            fiber.alternate = Some(current);
            let wip = arena.alloc(fiber);
            arena[current].alternate = Some(wip);
            wip
        }
    };

    let src = &arena[current];
    let child = src.child;
    let sibling = src.sibling;
    let index = src.index;
    let memoized_props = src.memoized_props.clone();
    let memoized_state = src.memoized_state.clone();
    let effects = src.effects.clone();
    let lanes = src.lanes;
    let child_lanes = src.child_lanes;

    let fiber = &mut arena[wip];
    fiber.child = child;
    fiber.sibling = sibling;
    fiber.index = index;
    fiber.memoized_props = memoized_props;
    fiber.memoized_state = memoized_state;
    fiber.effects = effects;
    fiber.lanes = lanes;
    fiber.child_lanes = child_lanes;
    wip
}

pub fn create_fiber_from_element(arena: &mut FiberArena, element: &Element) -> FiberId {
    let mut fiber = Fiber::new(
        WorkTag::of(&element.ty),
        FiberProps::Element(element.props.clone()),
        element.key.clone(),
    );
    fiber.element_type = Some(element.ty.clone());
    arena.alloc(fiber)
}

pub fn create_fiber_from_text(arena: &mut FiberArena, text: Rc<str>) -> FiberId {
    arena.alloc(Fiber::new(WorkTag::HostText, FiberProps::Text(text), None))
}

/// An implicit fragment wrapping a nested child list.
pub fn create_fiber_from_fragment(
    arena: &mut FiberArena,
    children: Node,
    key: Option<Key>,
) -> FiberId {
    let mut fiber = Fiber::new(
        WorkTag::Fragment,
        FiberProps::Element(Props::with_children(children)),
        key,
    );
    fiber.element_type = Some(ElementType::Fragment);
    arena.alloc(fiber)
}
