//! Root records and the tree that owns every node.

use spark_signals::{Signal, signal};

use super::{Fiber, FiberArena, FiberId, FiberProps, Lanes, MemoizedState, StateNode, WorkTag};
use crate::element::Node;
use crate::error::ReconcileError;
use crate::host::HostNode;

/// Identity of a root inside one renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub(crate) u32);

/// Per-container record.
pub struct FiberRoot {
    pub id: RootId,
    pub container: HostNode,
    /// Committed HostRoot node.
    pub current: FiberId,
    /// HostRoot node of a render that finished but has not committed.
    pub finished_work: Option<FiberId>,
    pub pending_lanes: Lanes,
    pub finished_lanes: Lanes,
    /// False until the first commit; the first render does not track deletions.
    pub has_committed: bool,
    /// Bumped after every commit.
    pub revision: Signal<u64>,
}

/// Arena plus root records.
#[derive(Default)]
pub struct FiberTree {
    pub arena: FiberArena,
    roots: Vec<FiberRoot>,
}

impl FiberTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root record with an uncommitted HostRoot node.
    pub fn create_root(&mut self, container: HostNode) -> RootId {
        let id = RootId(self.roots.len() as u32);
        let mut fiber = Fiber::new(WorkTag::HostRoot, FiberProps::Empty, None);
        fiber.state_node = StateNode::Root(id);
        fiber.memoized_state = MemoizedState::Root(Node::Empty);
        let current = self.arena.alloc(fiber);

        self.roots.push(FiberRoot {
            id,
            container,
            current,
            finished_work: None,
            pending_lanes: Lanes::empty(),
            finished_lanes: Lanes::empty(),
            has_committed: false,
            revision: signal(0),
        });
        id
    }

    pub fn root(&self, id: RootId) -> Result<&FiberRoot, ReconcileError> {
        self.roots
            .get(id.0 as usize)
            .ok_or(ReconcileError::UnknownRoot(id))
    }

    pub fn root_mut(&mut self, id: RootId) -> Result<&mut FiberRoot, ReconcileError> {
        self.roots
            .get_mut(id.0 as usize)
            .ok_or(ReconcileError::UnknownRoot(id))
    }

    /// Record `lane` on `fiber` (both generations) and on every ancestor's
    /// child lanes. Returns the root the fiber belongs to, if it is still
    /// attached to one.
    pub fn mark_update_lane_from_fiber_to_root(
        &mut self,
        fiber: FiberId,
        lane: Lanes,
    ) -> Option<RootId> {
        if !self.arena.contains(fiber) {
            return None;
        }
        self.arena[fiber].lanes |= lane;
        if let Some(alt) = self.arena[fiber].alternate.filter(|a| self.arena.contains(*a)) {
            self.arena[alt].lanes |= lane;
        }

        let mut node = fiber;
        while let Some(parent) = self.arena[node].return_fiber {
            if !self.arena.contains(parent) {
                return None;
            }
            self.arena[parent].child_lanes |= lane;
            if let Some(alt) = self.arena[parent].alternate.filter(|a| self.arena.contains(*a)) {
                self.arena[alt].child_lanes |= lane;
            }
            node = parent;
        }

        match self.arena[node].state_node {
            StateNode::Root(id) if self.arena[node].tag == WorkTag::HostRoot => {
                if let Ok(root) = self.root_mut(id) {
                    root.pending_lanes |= lane;
                }
                Some(id)
            }
            _ => None,
        }
    }
}
