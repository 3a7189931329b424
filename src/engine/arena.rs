//! Fiber Arena - Index allocation for render-tree nodes.
//!
//! Nodes are NOT heap objects linked by references. They live in one arena
//! and link to each other by [`FiberId`]:
//! - Free index pool for O(1) reuse
//! - Generation counter per slot so a stale id never aliases a reused slot
//! - Live count for leak checks in tests

use std::fmt;
use std::ops::{Index, IndexMut};

use super::fiber::Fiber;

// =============================================================================
// FiberId
// =============================================================================

/// Handle to a node in a [`FiberArena`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FiberId {
    index: u32,
    generation: u32,
}

impl FiberId {
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

impl fmt::Debug for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fiber#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for FiberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

// =============================================================================
// Arena
// =============================================================================

struct Slot {
    generation: u32,
    fiber: Option<Fiber>,
}

/// Owner of every node of every generation.
#[derive(Default)]
pub struct FiberArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl FiberArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a node and return its id. Reuses a freed slot when available.
    pub fn alloc(&mut self, fiber: Fiber) -> FiberId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.fiber = Some(fiber);
            return FiberId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            fiber: Some(fiber),
        });
        FiberId {
            index,
            generation: 0,
        }
    }

    /// Remove a node. Returns `None` for stale or already-released ids.
    pub fn release(&mut self, id: FiberId) -> Option<Fiber> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let fiber = slot.fiber.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(fiber)
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.fiber.as_ref())
    }

    pub fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.fiber.as_mut())
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate a sibling list starting at `first`.
    pub fn siblings(&self, first: Option<FiberId>) -> Siblings<'_> {
        Siblings {
            arena: self,
            next: first,
        }
    }
}

/// Panics on a stale id: every id the reconciler dereferences must be live.
impl Index<FiberId> for FiberArena {
    type Output = Fiber;

    fn index(&self, id: FiberId) -> &Fiber {
        match self.get(id) {
            Some(fiber) => fiber,
            None => panic!("stale fiber id {id:?}"),
        }
    }
}

impl IndexMut<FiberId> for FiberArena {
    fn index_mut(&mut self, id: FiberId) -> &mut Fiber {
        match self.get_mut(id) {
            Some(fiber) => fiber,
            None => panic!("stale fiber id {id:?}"),
        }
    }
}

/// Iterator over a sibling chain.
pub struct Siblings<'a> {
    arena: &'a FiberArena,
    next: Option<FiberId>,
}

impl Iterator for Siblings<'_> {
    type Item = FiberId;

    fn next(&mut self) -> Option<FiberId> {
        let id = self.next?;
        self.next = self.arena.get(id).and_then(|f| f.sibling);
        Some(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FiberProps, WorkTag};

    fn text_fiber(s: &str) -> Fiber {
        Fiber::new(WorkTag::HostText, FiberProps::Text(s.into()), None)
    }

    #[test]
    fn test_alloc_sequential() {
        let mut arena = FiberArena::new();
        let a = arena.alloc(text_fiber("a"));
        let b = arena.alloc(text_fiber("b"));
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_release_and_reuse() {
        let mut arena = FiberArena::new();
        let a = arena.alloc(text_fiber("a"));
        let _b = arena.alloc(text_fiber("b"));

        assert!(arena.release(a).is_some());
        assert!(!arena.contains(a));
        assert_eq!(arena.len(), 1);

        // Should reuse the freed slot with a new generation
        let c = arena.alloc(text_fiber("c"));
        assert_eq!(c.index(), a.index());
        assert_ne!(c, a);
        assert!(arena.get(a).is_none());
        assert!(arena.get(c).is_some());
    }

    #[test]
    fn test_double_release_is_noop() {
        let mut arena = FiberArena::new();
        let a = arena.alloc(text_fiber("a"));
        assert!(arena.release(a).is_some());
        assert!(arena.release(a).is_none());
        assert_eq!(arena.len(), 0);
    }

    #[test]
    #[should_panic(expected = "stale fiber id")]
    fn test_index_stale_panics() {
        let mut arena = FiberArena::new();
        let a = arena.alloc(text_fiber("a"));
        arena.release(a);
        let _ = &arena[a];
    }

    #[test]
    fn test_siblings_iterator() {
        let mut arena = FiberArena::new();
        let a = arena.alloc(text_fiber("a"));
        let b = arena.alloc(text_fiber("b"));
        let c = arena.alloc(text_fiber("c"));
        arena[a].sibling = Some(b);
        arena[b].sibling = Some(c);
        let ids: Vec<_> = arena.siblings(Some(a)).collect();
        assert_eq!(ids, vec![a, b, c]);
        assert_eq!(arena.siblings(None).count(), 0);
    }
}
