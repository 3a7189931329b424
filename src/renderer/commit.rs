//! Commit engine - apply a finished tree to the host.
//!
//! Mutation walks the finished tree once:
//!
//! - host updates on the way down (a parent's text reset lands before
//!   its new children are inserted)
//! - placements and deletions on the way up, children before parents
//!
//! Effects are only collected here. User code (cleanups, effect bodies,
//! `component_will_unmount`) runs from [`CommitEffects`] after the caller
//! has released the tree.

use std::rc::Rc;

use tracing::trace;

use crate::engine::{
    ClassInstance, FiberArena, FiberId, FiberTree, Flags, PropChange, RootId, StateNode, WorkTag,
};
use crate::error::{ReconcileError, Result};
use crate::hooks::{Effect, HookFlags};
use crate::host::{HostConfig, HostNode};

// =============================================================================
// Collected effects
// =============================================================================

/// Effects gathered by one commit, in the order they must run.
#[derive(Default)]
pub(crate) struct CommitEffects {
    /// Layout effects of deleted components; their cleanups run.
    pub(crate) layout_unmounts: Vec<Rc<Effect>>,
    pub(crate) class_unmounts: Vec<ClassInstance>,
    /// Layout effects that fire this commit (cleanup, then create).
    pub(crate) layout_mounts: Vec<Rc<Effect>>,
    pub(crate) passive: PassiveEffects,
}

impl CommitEffects {
    /// Layout phase. Runs synchronously as part of the commit.
    pub(crate) fn run_layout(&mut self) {
        for effect in self.layout_unmounts.drain(..) {
            effect.destroy();
        }
        for instance in self.class_unmounts.drain(..) {
            instance.borrow_mut().component_will_unmount();
        }
        for effect in &self.layout_mounts {
            effect.destroy();
        }
        for effect in self.layout_mounts.drain(..) {
            effect.create();
        }
    }
}

/// Passive effects waiting for their deferred flush.
#[derive(Default)]
pub(crate) struct PassiveEffects {
    pub(crate) unmounts: Vec<Rc<Effect>>,
    pub(crate) mounts: Vec<Rc<Effect>>,
}

impl PassiveEffects {
    pub(crate) fn is_empty(&self) -> bool {
        self.unmounts.is_empty() && self.mounts.is_empty()
    }

    pub(crate) fn append(&mut self, other: &mut PassiveEffects) {
        self.unmounts.append(&mut other.unmounts);
        self.mounts.append(&mut other.mounts);
    }

    /// Every cleanup first, then every create.
    pub(crate) fn run(self) {
        for effect in &self.unmounts {
            effect.destroy();
        }
        for effect in &self.mounts {
            effect.destroy();
        }
        for effect in &self.mounts {
            effect.create();
        }
    }
}

// =============================================================================
// Mutation
// =============================================================================

/// Apply the host mutations of `finished` and collect its effects.
pub(crate) fn commit_mutation_effects(
    tree: &mut FiberTree,
    host: &dyn HostConfig,
    root: RootId,
    finished: FiberId,
) -> Result<CommitEffects> {
    let container = tree.root(root)?.container;
    let mut committer = Committer {
        arena: &mut tree.arena,
        host,
        container,
        effects: CommitEffects::default(),
    };
    committer.commit_mutation_on_fiber(finished)?;
    committer.collect_effects(finished);
    Ok(committer.effects)
}

struct Committer<'a> {
    arena: &'a mut FiberArena,
    host: &'a dyn HostConfig,
    container: HostNode,
    effects: CommitEffects,
}

impl Committer<'_> {
    fn commit_mutation_on_fiber(&mut self, fiber: FiberId) -> Result<()> {
        let tag = self.arena[fiber].tag;
        let flags = self.arena[fiber].flags;

        if flags.contains(Flags::CONTENT_RESET) {
            self.commit_deletions(fiber)?;
        }
        if flags.contains(Flags::UPDATE) {
            self.commit_update(fiber, tag)?;
        }

        let mut child = self.arena[fiber].child;
        while let Some(c) = child {
            self.commit_mutation_on_fiber(c)?;
            child = self.arena[c].sibling;
        }

        if flags.contains(Flags::PLACEMENT) {
            self.commit_placement(fiber)?;
        }
        self.commit_deletions(fiber)?;
        self.arena[fiber].flags.remove(Flags::MUTATION_MASK);
        Ok(())
    }

    fn commit_update(&mut self, fiber: FiberId, tag: WorkTag) -> Result<()> {
        match tag {
            WorkTag::HostText => {
                let node = self.host_node(fiber)?;
                let text = self.arena[fiber]
                    .pending_props
                    .as_text()
                    .map(str::to_owned)
                    .unwrap_or_default();
                self.host.set_text_content(node, &text)?;
            }
            WorkTag::HostComponent => {
                let node = self.host_node(fiber)?;
                let payload = std::mem::take(&mut self.arena[fiber].update_payload);
                for change in &payload {
                    self.apply_change(node, change)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_change(&self, node: HostNode, change: &PropChange) -> Result<()> {
        match change {
            PropChange::Set(name, value) => self.host.set_property(node, name, value)?,
            PropChange::Remove(name) => self.host.remove_property(node, name)?,
            PropChange::AddListener(event, listener) => {
                self.host.add_event_listener(node, event, listener.clone())?
            }
            PropChange::RemoveListener(event) => self.host.remove_event_listener(node, event)?,
            PropChange::Text(text) => self.host.set_text_content(node, text.as_deref().unwrap_or(""))?,
        }
        Ok(())
    }

    fn host_node(&self, fiber: FiberId) -> Result<HostNode> {
        let fiber = &self.arena[fiber];
        fiber
            .state_node
            .host()
            .ok_or(ReconcileError::MissingHostNode(fiber.tag))
    }

    /// Nearest ancestor that can hold host children.
    fn get_host_parent_fiber(&self, fiber: FiberId) -> Result<FiberId> {
        let mut node = self.arena[fiber].return_fiber;
        while let Some(n) = node {
            if self.arena[n].tag.is_host_parent() {
                return Ok(n);
            }
            node = self.arena[n].return_fiber;
        }
        Err(ReconcileError::MissingHostParent(self.arena[fiber].tag))
    }

    fn host_parent_node(&self, parent: FiberId) -> Result<HostNode> {
        match self.arena[parent].tag {
            WorkTag::HostRoot => Ok(self.container),
            WorkTag::HostComponent => self.host_node(parent),
            tag => Err(ReconcileError::MissingHostParent(tag)),
        }
    }

    /// The host node `fiber` must be inserted before, skipping siblings that
    /// are themselves still waiting for placement.
    fn get_host_sibling(&self, fiber: FiberId) -> Option<HostNode> {
        let arena = &*self.arena;
        let mut node = fiber;
        'siblings: loop {
            while arena[node].sibling.is_none() {
                match arena[node].return_fiber {
                    Some(parent) if !arena[parent].tag.is_host_parent() => node = parent,
                    _ => return None,
                }
            }
            node = arena[node].sibling?;

            while !arena[node].tag.is_host() {
                if arena[node].flags.contains(Flags::PLACEMENT) {
                    continue 'siblings;
                }
                match arena[node].child {
                    Some(child) => node = child,
                    None => continue 'siblings,
                }
            }
            if !arena[node].flags.contains(Flags::PLACEMENT) {
                return arena[node].state_node.host();
            }
        }
    }

    fn commit_placement(&mut self, fiber: FiberId) -> Result<()> {
        let parent = self.get_host_parent_fiber(fiber)?;

        // An ancestor below the host parent is placed later and carries this node
        let mut ancestor = self.arena[fiber].return_fiber;
        while let Some(a) = ancestor {
            if a == parent {
                break;
            }
            if self.arena[a].flags.contains(Flags::PLACEMENT) {
                return Ok(());
            }
            ancestor = self.arena[a].return_fiber;
        }
        // A new host parent received its children when it was created
        if self.arena[parent].tag == WorkTag::HostComponent && self.arena[parent].alternate.is_none() {
            return Ok(());
        }

        let parent_node = self.host_parent_node(parent)?;
        let before = self.get_host_sibling(fiber);
        trace!(fiber = %fiber, ?parent_node, ?before, "placement");
        self.insert_or_append_placement_node(fiber, before, parent_node)
    }

    fn insert_or_append_placement_node(
        &self,
        fiber: FiberId,
        before: Option<HostNode>,
        parent: HostNode,
    ) -> Result<()> {
        if self.arena[fiber].tag.is_host() {
            let node = self.host_node(fiber)?;
            match before {
                Some(before) => self.host.insert_before(parent, node, before)?,
                None => self.host.append_child(parent, node)?,
            }
            return Ok(());
        }
        let mut child = self.arena[fiber].child;
        while let Some(c) = child {
            self.insert_or_append_placement_node(c, before, parent)?;
            child = self.arena[c].sibling;
        }
        Ok(())
    }

    fn commit_deletions(&mut self, fiber: FiberId) -> Result<()> {
        let deletions = std::mem::take(&mut self.arena[fiber].deletions);
        if deletions.is_empty() {
            return Ok(());
        }
        let parent = if self.arena[fiber].tag.is_host_parent() {
            fiber
        } else {
            self.get_host_parent_fiber(fiber)?
        };
        let parent_node = self.host_parent_node(parent)?;

        for deleted in deletions {
            trace!(fiber = %deleted, "deletion");
            let mut top = Vec::new();
            self.collect_top_host_nodes(deleted, &mut top);
            for node in top {
                self.host.remove_child(parent_node, node)?;
            }
            self.collect_unmounts(deleted);
            self.release_subtree(deleted);
        }
        Ok(())
    }

    fn collect_top_host_nodes(&self, fiber: FiberId, out: &mut Vec<HostNode>) {
        if self.arena[fiber].tag.is_host() {
            out.extend(self.arena[fiber].state_node.host());
            return;
        }
        let mut child = self.arena[fiber].child;
        while let Some(c) = child {
            self.collect_top_host_nodes(c, out);
            child = self.arena[c].sibling;
        }
    }

    fn collect_unmounts(&mut self, fiber: FiberId) {
        let node = &self.arena[fiber];
        match node.tag {
            WorkTag::FunctionComponent => {
                for effect in &node.effects {
                    if effect.tag().contains(HookFlags::LAYOUT) {
                        self.effects.layout_unmounts.push(effect.clone());
                    } else {
                        self.effects.passive.unmounts.push(effect.clone());
                    }
                }
            }
            WorkTag::ClassComponent => {
                if let StateNode::Instance(instance) = &node.state_node {
                    self.effects.class_unmounts.push(instance.clone());
                }
            }
            _ => {}
        }
        let mut child = self.arena[fiber].child;
        while let Some(c) = child {
            self.collect_unmounts(c);
            child = self.arena[c].sibling;
        }
    }

    /// Free a deleted subtree and the other generation of each node in it.
    fn release_subtree(&mut self, fiber: FiberId) {
        let mut stack = vec![fiber];
        let mut doomed = Vec::new();
        while let Some(id) = stack.pop() {
            if !self.arena.contains(id) {
                continue;
            }
            stack.extend(self.arena.siblings(self.arena[id].child));
            doomed.push(id);
            if let Some(alternate) = self.arena[id].alternate {
                doomed.push(alternate);
            }
        }
        for id in doomed {
            if self.arena.contains(id) {
                self.arena.release(id);
            }
        }
    }

    // =========================================================================
    // Effect collection
    // =========================================================================

    /// Children first, matching the order effects fire in.
    fn collect_effects(&mut self, fiber: FiberId) {
        let mut child = self.arena[fiber].child;
        while let Some(c) = child {
            self.collect_effects(c);
            child = self.arena[c].sibling;
        }

        let node = &mut self.arena[fiber];
        if node.tag != WorkTag::FunctionComponent
            || !node.flags.intersects(Flags::LAYOUT | Flags::PASSIVE)
        {
            return;
        }
        for effect in &node.effects {
            if effect.fires(HookFlags::LAYOUT) {
                self.effects.layout_mounts.push(effect.clone());
            } else if effect.fires(HookFlags::PASSIVE) {
                self.effects.passive.mounts.push(effect.clone());
            }
        }
        node.flags.remove(Flags::LAYOUT | Flags::PASSIVE);
    }
}
