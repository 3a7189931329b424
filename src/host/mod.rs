//! Host adapter - the native tree the reconciler drives.
//!
//! The reconciler never touches native nodes directly. Complete work creates
//! them, commit inserts, updates and removes them, all through
//! [`HostConfig`]. [`MemoryHost`] is an in-process implementation that
//! records every operation and renders markup for assertions.

mod memory;

pub use memory::*;

use thiserror::Error;

use crate::types::{Callback, Value};

/// Opaque handle to a native node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostNode(pub u64);

/// Failures reported by a host adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("unknown host node {0:?}")]
    UnknownNode(HostNode),

    #[error("{child:?} is not a child of {parent:?}")]
    NotAChild { parent: HostNode, child: HostNode },

    #[error("host node {0:?} cannot hold children")]
    NotAContainer(HostNode),
}

/// Native-tree operations used by complete and commit.
///
/// Methods take `&self`: adapters keep their own interior mutability so a
/// listener invoked by the host can call back into the renderer.
pub trait HostConfig {
    fn create_instance(&self, tag: &str) -> HostNode;

    fn create_text_instance(&self, text: &str) -> HostNode;

    fn append_child(&self, parent: HostNode, child: HostNode) -> Result<(), HostError>;

    /// Insert `child` before `before`, moving it if already attached.
    fn insert_before(
        &self,
        parent: HostNode,
        child: HostNode,
        before: HostNode,
    ) -> Result<(), HostError>;

    fn remove_child(&self, parent: HostNode, child: HostNode) -> Result<(), HostError>;

    /// Replace a node's content with text. For elements this drops every
    /// child; `""` leaves the element empty.
    fn set_text_content(&self, node: HostNode, text: &str) -> Result<(), HostError>;

    fn set_property(&self, node: HostNode, name: &str, value: &Value) -> Result<(), HostError>;

    fn remove_property(&self, node: HostNode, name: &str) -> Result<(), HostError>;

    fn add_event_listener(
        &self,
        node: HostNode,
        event: &str,
        listener: Callback,
    ) -> Result<(), HostError>;

    fn remove_event_listener(&self, node: HostNode, event: &str) -> Result<(), HostError>;
}
