//! In-memory host tree.
//!
//! Keeps live nodes in a map keyed by [`HostNode`], logs every mutation as a
//! [`HostOp`], and serialises subtrees to markup:
//!
//! ```text
//! <div className="app"><button>1</button><ul><li>a</li></ul></div>
//! ```
//!
//! A removed subtree is dropped along with its listeners; ids are never
//! reused. The op log grows until [`MemoryHost::take_ops`] drains it.

use std::cell::RefCell;
use std::collections::BTreeMap;

use tracing::trace;

use super::{HostConfig, HostError, HostNode};
use crate::types::{Callback, Value};

/// One recorded host mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    Create { node: HostNode, tag: String },
    CreateText { node: HostNode, text: String },
    Append { parent: HostNode, child: HostNode },
    Insert { parent: HostNode, child: HostNode, before: HostNode },
    Remove { parent: HostNode, child: HostNode },
    SetText { node: HostNode, text: String },
    SetProperty { node: HostNode, name: String },
    RemoveProperty { node: HostNode, name: String },
    AddListener { node: HostNode, event: String },
    RemoveListener { node: HostNode, event: String },
}

#[derive(Debug, Clone)]
enum NodeKind {
    Container(String),
    Element(String),
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: NodeKind,
    text_content: Option<String>,
    properties: BTreeMap<String, Value>,
    listeners: BTreeMap<String, Callback>,
    children: Vec<HostNode>,
    parent: Option<HostNode>,
}

impl MemoryNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            text_content: None,
            properties: BTreeMap::new(),
            listeners: BTreeMap::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

#[derive(Default)]
struct MemoryTree {
    nodes: BTreeMap<u64, MemoryNode>,
    next_id: u64,
    ops: Vec<HostOp>,
}

impl MemoryTree {
    fn alloc(&mut self, kind: NodeKind) -> HostNode {
        let id = HostNode(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id.0, MemoryNode::new(kind));
        id
    }

    fn node(&self, id: HostNode) -> Result<&MemoryNode, HostError> {
        self.nodes
            .get(&id.0)
            .ok_or(HostError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: HostNode) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(&id.0)
            .ok_or(HostError::UnknownNode(id))
    }

    fn container(&mut self, id: HostNode) -> Result<&mut MemoryNode, HostError> {
        let node = self.node_mut(id)?;
        match node.kind {
            NodeKind::Text(_) => Err(HostError::NotAContainer(id)),
            _ => Ok(node),
        }
    }

    fn detach(&mut self, child: HostNode) -> Result<(), HostError> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|c| *c != child);
        }
        Ok(())
    }

    /// Drop a detached node and everything below it.
    fn release(&mut self, root: HostNode) {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.remove(&id.0) {
                stack.extend(node.children);
            }
        }
    }

    fn write_markup(&self, id: HostNode, out: &mut String) {
        let Ok(node) = self.node(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::Container(_) => self.write_children(node, out),
            NodeKind::Element(tag) => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &node.properties {
                    if let Some(text) = value.to_text() {
                        out.push_str(&format!(" {name}=\"{text}\""));
                    }
                }
                out.push('>');
                self.write_children(node, out);
                out.push_str(&format!("</{tag}>"));
            }
        }
    }

    fn write_children(&self, node: &MemoryNode, out: &mut String) {
        if let Some(text) = &node.text_content {
            out.push_str(text);
        }
        for child in &node.children {
            self.write_markup(*child, out);
        }
    }
}

/// Host adapter backed by an in-memory tree.
#[derive(Default)]
pub struct MemoryHost {
    tree: RefCell<MemoryTree>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A root container (the `#root` of a page).
    pub fn create_container(&self, name: &str) -> HostNode {
        self.tree
            .borrow_mut()
            .alloc(NodeKind::Container(name.to_string()))
    }

    /// Serialise the subtree under `node`; containers print only children.
    pub fn to_markup(&self, node: HostNode) -> String {
        let mut out = String::new();
        self.tree.borrow().write_markup(node, &mut out);
        out
    }

    pub fn children(&self, node: HostNode) -> Vec<HostNode> {
        self.tree
            .borrow()
            .node(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    pub fn parent(&self, node: HostNode) -> Option<HostNode> {
        self.tree.borrow().node(node).ok().and_then(|n| n.parent)
    }

    pub fn tag(&self, node: HostNode) -> Option<String> {
        match &self.tree.borrow().node(node).ok()?.kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            _ => None,
        }
    }

    pub fn property(&self, node: HostNode, name: &str) -> Option<Value> {
        self.tree
            .borrow()
            .node(node)
            .ok()
            .and_then(|n| n.properties.get(name).cloned())
    }

    pub fn has_listener(&self, node: HostNode, event: &str) -> bool {
        self.tree
            .borrow()
            .node(node)
            .is_ok_and(|n| n.listeners.contains_key(event))
    }

    /// Every element with `tag` under `root`, in document order.
    pub fn find_all(&self, root: HostNode, tag: &str) -> Vec<HostNode> {
        fn walk(tree: &MemoryTree, id: HostNode, tag: &str, out: &mut Vec<HostNode>) {
            let Ok(node) = tree.node(id) else {
                return;
            };
            if matches!(&node.kind, NodeKind::Element(t) if t == tag) {
                out.push(id);
            }
            for child in &node.children {
                walk(tree, *child, tag, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.tree.borrow(), root, tag, &mut out);
        out
    }

    pub fn find(&self, root: HostNode, tag: &str) -> Option<HostNode> {
        self.find_all(root, tag).into_iter().next()
    }

    /// Invoke the listener registered for `event` on `node`.
    ///
    /// The listener runs with the tree unborrowed, so it may trigger
    /// updates that mutate this host.
    pub fn dispatch_event(&self, node: HostNode, event: &str) -> bool {
        let listener = self
            .tree
            .borrow()
            .node(node)
            .ok()
            .and_then(|n| n.listeners.get(event).cloned());
        match listener {
            Some(listener) => {
                trace!(?node, event, "dispatching event");
                listener.call();
                true
            }
            None => false,
        }
    }

    pub fn click(&self, node: HostNode) -> bool {
        self.dispatch_event(node, "click")
    }

    pub fn ops(&self) -> Vec<HostOp> {
        self.tree.borrow().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<HostOp> {
        std::mem::take(&mut self.tree.borrow_mut().ops)
    }

    /// Live nodes, containers and detached nodes included.
    pub fn node_count(&self) -> usize {
        self.tree.borrow().nodes.len()
    }

    /// Nodes ever created.
    pub fn created_count(&self) -> u64 {
        self.tree.borrow().next_id
    }
}

impl HostConfig for MemoryHost {
    fn create_instance(&self, tag: &str) -> HostNode {
        let mut tree = self.tree.borrow_mut();
        let node = tree.alloc(NodeKind::Element(tag.to_string()));
        tree.ops.push(HostOp::Create {
            node,
            tag: tag.to_string(),
        });
        node
    }

    fn create_text_instance(&self, text: &str) -> HostNode {
        let mut tree = self.tree.borrow_mut();
        let node = tree.alloc(NodeKind::Text(text.to_string()));
        tree.ops.push(HostOp::CreateText {
            node,
            text: text.to_string(),
        });
        node
    }

    fn append_child(&self, parent: HostNode, child: HostNode) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.container(parent)?;
        tree.detach(child)?;
        tree.node_mut(parent)?.children.push(child);
        tree.node_mut(child)?.parent = Some(parent);
        tree.ops.push(HostOp::Append { parent, child });
        Ok(())
    }

    fn insert_before(
        &self,
        parent: HostNode,
        child: HostNode,
        before: HostNode,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.container(parent)?;
        if tree.node(before)?.parent != Some(parent) {
            return Err(HostError::NotAChild {
                parent,
                child: before,
            });
        }
        tree.detach(child)?;
        let children = &mut tree.node_mut(parent)?.children;
        let pos = children
            .iter()
            .position(|c| *c == before)
            .ok_or(HostError::NotAChild {
                parent,
                child: before,
            })?;
        children.insert(pos, child);
        tree.node_mut(child)?.parent = Some(parent);
        tree.ops.push(HostOp::Insert {
            parent,
            child,
            before,
        });
        Ok(())
    }

    fn remove_child(&self, parent: HostNode, child: HostNode) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        if tree.node(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        tree.detach(child)?;
        tree.release(child);
        tree.ops.push(HostOp::Remove { parent, child });
        Ok(())
    }

    fn set_text_content(&self, node: HostNode, text: &str) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        let children = {
            let target = tree.node_mut(node)?;
            match &mut target.kind {
                NodeKind::Text(content) => {
                    *content = text.to_string();
                    Vec::new()
                }
                _ => {
                    target.text_content = (!text.is_empty()).then(|| text.to_string());
                    std::mem::take(&mut target.children)
                }
            }
        };
        for child in children {
            tree.node_mut(child)?.parent = None;
        }
        tree.ops.push(HostOp::SetText {
            node,
            text: text.to_string(),
        });
        Ok(())
    }

    fn set_property(&self, node: HostNode, name: &str, value: &Value) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.node_mut(node)?
            .properties
            .insert(name.to_string(), value.clone());
        tree.ops.push(HostOp::SetProperty {
            node,
            name: name.to_string(),
        });
        Ok(())
    }

    fn remove_property(&self, node: HostNode, name: &str) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.node_mut(node)?.properties.remove(name);
        tree.ops.push(HostOp::RemoveProperty {
            node,
            name: name.to_string(),
        });
        Ok(())
    }

    fn add_event_listener(
        &self,
        node: HostNode,
        event: &str,
        listener: Callback,
    ) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.node_mut(node)?
            .listeners
            .insert(event.to_string(), listener);
        tree.ops.push(HostOp::AddListener {
            node,
            event: event.to_string(),
        });
        Ok(())
    }

    fn remove_event_listener(&self, node: HostNode, event: &str) -> Result<(), HostError> {
        let mut tree = self.tree.borrow_mut();
        tree.node_mut(node)?.listeners.remove(event);
        tree.ops.push(HostOp::RemoveListener {
            node,
            event: event.to_string(),
        });
        Ok(())
    }
}
