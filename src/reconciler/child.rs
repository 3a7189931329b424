//! Child reconciliation - diff a node's old children against new descriptions.
//!
//! One algorithm, two instantiations: with `track_side_effects` the
//! reconciler records deletions and moves; without it (a subtree's first
//! render) there is nothing old to delete or move. Fresh nodes are flagged
//! `PLACEMENT` either way.
//!
//! List diffing runs in three passes:
//!
//! ```text
//! old: a b c d e          new: a c b d e
//!
//! 1. lockstep while keys match        a        (stops at b != c)
//! 2. tail shortcuts                   (both lists still have items)
//! 3. keyed map of remaining old       c b d e  (b moved: old index 1 < 2)
//! ```
//!
//! Move detection tracks `last_placed_index`: a reused node whose old index
//! is below it must be re-inserted, otherwise it stays put and becomes the
//! new high-water mark.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use tracing::warn;

use crate::element::{Element, ElementType, Node, Props};
use crate::engine::{
    create_fiber_from_element, create_fiber_from_fragment, create_fiber_from_text,
    create_work_in_progress, FiberArena, FiberId, FiberProps, Flags, WorkTag,
};
use crate::types::Key;

/// Identity of an old child in the keyed map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ChildKey {
    Key(Key),
    Index(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct ChildReconciler {
    track_side_effects: bool,
}

impl ChildReconciler {
    /// Reconciler for children that already have a committed generation.
    pub fn update() -> Self {
        Self {
            track_side_effects: true,
        }
    }

    /// Reconciler for a first render.
    pub fn mount() -> Self {
        Self {
            track_side_effects: false,
        }
    }

    /// Reconcile `new_child` against the old list starting at
    /// `current_first_child`. Returns the new first child.
    ///
    /// # Arguments
    ///
    /// * `return_fiber` - work-in-progress parent; receives deletions
    /// * `current_first_child` - first child of the committed generation
    pub fn reconcile_child_fibers(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_child: &Node,
    ) -> Option<FiberId> {
        // Unkeyed top-level fragments are transparent
        let new_child = match new_child {
            Node::Element(el) if matches!(el.ty, ElementType::Fragment) && el.key.is_none() => {
                el.props.children()
            }
            other => other,
        };

        match new_child {
            Node::Text(text) if !text.is_empty() => {
                let fiber = self.reconcile_single_text_node(
                    arena,
                    return_fiber,
                    current_first_child,
                    text.clone(),
                );
                Some(self.place_single_child(arena, fiber))
            }
            Node::Element(element) => {
                let fiber =
                    self.reconcile_single_element(arena, return_fiber, current_first_child, element);
                Some(self.place_single_child(arena, fiber))
            }
            Node::List(children) => {
                self.reconcile_children_array(arena, return_fiber, current_first_child, children)
            }
            _ => {
                self.delete_remaining_children(arena, return_fiber, current_first_child);
                None
            }
        }
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    fn delete_child(&self, arena: &mut FiberArena, return_fiber: FiberId, child: FiberId) {
        if !self.track_side_effects {
            return;
        }
        let parent = &mut arena[return_fiber];
        parent.deletions.push(child);
        parent.flags |= Flags::CHILD_DELETION;
    }

    fn delete_remaining_children(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        first: Option<FiberId>,
    ) {
        if !self.track_side_effects {
            return;
        }
        let doomed: Vec<FiberId> = arena.siblings(first).collect();
        for child in doomed {
            self.delete_child(arena, return_fiber, child);
        }
    }

    // =========================================================================
    // Placement
    // =========================================================================

    fn use_fiber(&self, arena: &mut FiberArena, fiber: FiberId, props: FiberProps) -> FiberId {
        let clone = create_work_in_progress(arena, fiber, props);
        arena[clone].index = 0;
        arena[clone].sibling = None;
        clone
    }

    fn place_single_child(&self, arena: &mut FiberArena, fiber: FiberId) -> FiberId {
        if arena[fiber].alternate.is_none() {
            arena[fiber].flags |= Flags::PLACEMENT;
        }
        fiber
    }

    fn place_child(
        &self,
        arena: &mut FiberArena,
        new_fiber: FiberId,
        last_placed_index: usize,
        new_index: usize,
    ) -> usize {
        arena[new_fiber].index = new_index;

        let Some(current) = arena[new_fiber].alternate else {
            // Fresh node
            arena[new_fiber].flags |= Flags::PLACEMENT;
            return last_placed_index;
        };
        if !self.track_side_effects {
            return last_placed_index;
        }

        let old_index = arena[current].index;
        if old_index < last_placed_index {
            // Moved right past a node that stayed put
            arena[new_fiber].flags |= Flags::PLACEMENT;
            last_placed_index
        } else {
            old_index
        }
    }

    // =========================================================================
    // Single child
    // =========================================================================

    fn reconcile_single_text_node(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        text: Rc<str>,
    ) -> FiberId {
        if let Some(first) = current_first_child {
            if arena[first].tag == WorkTag::HostText {
                let rest = arena[first].sibling;
                self.delete_remaining_children(arena, return_fiber, rest);
                let existing = self.use_fiber(arena, first, FiberProps::Text(text));
                arena[existing].return_fiber = Some(return_fiber);
                return existing;
            }
        }

        self.delete_remaining_children(arena, return_fiber, current_first_child);
        let created = create_fiber_from_text(arena, text);
        arena[created].return_fiber = Some(return_fiber);
        created
    }

    fn reconcile_single_element(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let mut child = current_first_child;
        while let Some(current) = child {
            if arena[current].key == element.key {
                let same_type = arena[current]
                    .element_type
                    .as_ref()
                    .is_some_and(|ty| ty.same_type(&element.ty));
                if same_type {
                    let rest = arena[current].sibling;
                    self.delete_remaining_children(arena, return_fiber, rest);
                    let existing = self.use_fiber(
                        arena,
                        current,
                        FiberProps::Element(element.props.clone()),
                    );
                    arena[existing].return_fiber = Some(return_fiber);
                    return existing;
                }
                // Key matched, type did not: nothing after it can match either
                self.delete_remaining_children(arena, return_fiber, Some(current));
                break;
            }
            self.delete_child(arena, return_fiber, current);
            child = arena[current].sibling;
        }

        let created = create_fiber_from_element(arena, element);
        arena[created].return_fiber = Some(return_fiber);
        created
    }

    // =========================================================================
    // Slot updates
    // =========================================================================

    fn update_text_node(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current: Option<FiberId>,
        text: Rc<str>,
    ) -> FiberId {
        let fiber = match current.filter(|c| arena[*c].tag == WorkTag::HostText) {
            Some(current) => self.use_fiber(arena, current, FiberProps::Text(text)),
            None => create_fiber_from_text(arena, text),
        };
        arena[fiber].return_fiber = Some(return_fiber);
        fiber
    }

    fn update_element(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current: Option<FiberId>,
        element: &Element,
    ) -> FiberId {
        let reusable = current.filter(|c| {
            arena[*c]
                .element_type
                .as_ref()
                .is_some_and(|ty| ty.same_type(&element.ty))
        });
        let fiber = match reusable {
            Some(current) => {
                self.use_fiber(arena, current, FiberProps::Element(element.props.clone()))
            }
            None => create_fiber_from_element(arena, element),
        };
        arena[fiber].return_fiber = Some(return_fiber);
        fiber
    }

    fn update_fragment(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current: Option<FiberId>,
        children: &[Node],
    ) -> FiberId {
        let list = Node::List(children.to_vec());
        let fiber = match current.filter(|c| arena[*c].tag == WorkTag::Fragment) {
            Some(current) => self.use_fiber(
                arena,
                current,
                FiberProps::Element(Props::with_children(list)),
            ),
            None => create_fiber_from_fragment(arena, list, None),
        };
        arena[fiber].return_fiber = Some(return_fiber);
        fiber
    }

    fn create_child(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        new_child: &Node,
    ) -> Option<FiberId> {
        let fiber = match new_child {
            Node::Text(text) if !text.is_empty() => create_fiber_from_text(arena, text.clone()),
            Node::Element(element) => create_fiber_from_element(arena, element),
            Node::List(children) => {
                create_fiber_from_fragment(arena, Node::List(children.clone()), None)
            }
            _ => return None,
        };
        arena[fiber].return_fiber = Some(return_fiber);
        Some(fiber)
    }

    /// Update `old_fiber`'s slot in place if keys agree; `None` otherwise.
    fn update_slot(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        old_fiber: Option<FiberId>,
        new_child: &Node,
    ) -> Option<FiberId> {
        let key = old_fiber.and_then(|f| arena[f].key.clone());
        match new_child {
            Node::Text(text) if !text.is_empty() => {
                // Text nodes have no key
                if key.is_some() {
                    return None;
                }
                Some(self.update_text_node(arena, return_fiber, old_fiber, text.clone()))
            }
            Node::Element(element) => {
                if element.key != key {
                    return None;
                }
                Some(self.update_element(arena, return_fiber, old_fiber, element))
            }
            Node::List(children) => {
                if key.is_some() {
                    return None;
                }
                Some(self.update_fragment(arena, return_fiber, old_fiber, children))
            }
            _ => None,
        }
    }

    fn update_from_map(
        &self,
        arena: &mut FiberArena,
        existing: &HashMap<ChildKey, FiberId>,
        return_fiber: FiberId,
        new_idx: usize,
        new_child: &Node,
    ) -> Option<FiberId> {
        match new_child {
            Node::Text(text) if !text.is_empty() => {
                let matched = existing.get(&ChildKey::Index(new_idx)).copied();
                Some(self.update_text_node(arena, return_fiber, matched, text.clone()))
            }
            Node::Element(element) => {
                let lookup = match &element.key {
                    Some(key) => ChildKey::Key(key.clone()),
                    None => ChildKey::Index(new_idx),
                };
                let matched = existing.get(&lookup).copied();
                Some(self.update_element(arena, return_fiber, matched, element))
            }
            Node::List(children) => {
                let matched = existing.get(&ChildKey::Index(new_idx)).copied();
                Some(self.update_fragment(arena, return_fiber, matched, children))
            }
            _ => None,
        }
    }

    // =========================================================================
    // Lists
    // =========================================================================

    fn reconcile_children_array(
        &self,
        arena: &mut FiberArena,
        return_fiber: FiberId,
        current_first_child: Option<FiberId>,
        new_children: &[Node],
    ) -> Option<FiberId> {
        warn_on_duplicate_keys(new_children);

        let mut result_first: Option<FiberId> = None;
        let mut previous_new: Option<FiberId> = None;
        let mut link = |arena: &mut FiberArena, fiber: FiberId| {
            match previous_new {
                Some(prev) => arena[prev].sibling = Some(fiber),
                None => result_first = Some(fiber),
            }
            previous_new = Some(fiber);
        };

        let mut old_fiber = current_first_child;
        let mut last_placed_index = 0;
        let mut new_idx = 0;

        // Pass 1: walk both lists in lockstep while slots line up
        while let Some(old) = old_fiber {
            if new_idx >= new_children.len() {
                break;
            }
            // A gap in the old list: compare against nothing this round
            let (candidate, next_old_fiber) = if arena[old].index > new_idx {
                (None, Some(old))
            } else {
                (Some(old), arena[old].sibling)
            };

            let Some(new_fiber) =
                self.update_slot(arena, return_fiber, candidate, &new_children[new_idx])
            else {
                // Keys diverged; leave the candidate for the map pass
                if candidate.is_none() {
                    old_fiber = next_old_fiber;
                }
                break;
            };

            if self.track_side_effects {
                if let Some(candidate) = candidate {
                    if arena[new_fiber].alternate.is_none() {
                        // Slot matched but the node could not be reused
                        self.delete_child(arena, return_fiber, candidate);
                    }
                }
            }
            last_placed_index = self.place_child(arena, new_fiber, last_placed_index, new_idx);
            link(arena, new_fiber);
            old_fiber = next_old_fiber;
            new_idx += 1;
        }

        // Pass 2a: new list exhausted, drop what is left of the old one
        if new_idx == new_children.len() {
            self.delete_remaining_children(arena, return_fiber, old_fiber);
            return result_first;
        }

        // Pass 2b: old list exhausted, everything left is an insertion
        if old_fiber.is_none() {
            for (idx, child) in new_children.iter().enumerate().skip(new_idx) {
                let Some(new_fiber) = self.create_child(arena, return_fiber, child) else {
                    continue;
                };
                last_placed_index = self.place_child(arena, new_fiber, last_placed_index, idx);
                link(arena, new_fiber);
            }
            return result_first;
        }

        // Pass 3: keyed map of the remaining old children
        let mut order = Vec::new();
        let mut existing = HashMap::new();
        let mut shadowed = Vec::new();
        for fiber in arena.siblings(old_fiber) {
            let key = match &arena[fiber].key {
                Some(key) => ChildKey::Key(key.clone()),
                None => ChildKey::Index(arena[fiber].index),
            };
            order.push(key.clone());
            // Duplicate keys: the later old child owns the slot
            if let Some(previous) = existing.insert(key, fiber) {
                shadowed.push(previous);
            }
        }

        for (idx, child) in new_children.iter().enumerate().skip(new_idx) {
            let Some(new_fiber) = self.update_from_map(arena, &existing, return_fiber, idx, child)
            else {
                continue;
            };
            if self.track_side_effects && arena[new_fiber].alternate.is_some() {
                // Consumed: must not be deleted below
                let consumed = match &arena[new_fiber].key {
                    Some(key) => ChildKey::Key(key.clone()),
                    None => ChildKey::Index(idx),
                };
                existing.remove(&consumed);
            }
            last_placed_index = self.place_child(arena, new_fiber, last_placed_index, idx);
            link(arena, new_fiber);
        }

        if self.track_side_effects {
            for fiber in shadowed {
                self.delete_child(arena, return_fiber, fiber);
            }
            for key in order {
                if let Some(fiber) = existing.remove(&key) {
                    self.delete_child(arena, return_fiber, fiber);
                }
            }
        }

        result_first
    }
}

fn warn_on_duplicate_keys(children: &[Node]) {
    let mut seen = HashSet::new();
    for child in children {
        if let Node::Element(Element { key: Some(key), .. }) = child {
            if !seen.insert(key) {
                warn!(%key, "duplicate key in child list; identity is ambiguous");
            }
        }
    }
}
