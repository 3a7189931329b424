//! Node side-effect flags and update lanes.

use bitflags::bitflags;

bitflags! {
    /// Side effects recorded on a node during render, consumed by commit.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u32 {
        /// Insert (or move) this node's host nodes.
        const PLACEMENT = 1 << 1;
        /// Host props or text changed.
        const UPDATE = 1 << 2;
        /// `deletions` is non-empty.
        const CHILD_DELETION = 1 << 3;
        /// Host element switches to plain text content.
        const CONTENT_RESET = 1 << 4;
        /// Layout effects to run after mutation.
        const LAYOUT = 1 << 5;
        /// Deferred (passive) effects.
        const PASSIVE = 1 << 6;
    }
}

impl Flags {
    /// Flags that commit's mutation pass acts on.
    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::CONTENT_RESET);
}

bitflags! {
    /// Update priority lanes. Lower bit means more urgent.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Lanes: u32 {
        const SYNC = 1;
        const INPUT_CONTINUOUS_HYDRATION = 1 << 1;
        const INPUT_CONTINUOUS = 1 << 2;
        const DEFAULT_HYDRATION = 1 << 3;
        const DEFAULT = 1 << 4;
    }
}

impl Lanes {
    /// The most urgent lane in the set.
    pub fn highest_priority(self) -> Lanes {
        Lanes::from_bits_truncate(self.bits() & self.bits().wrapping_neg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let mut flags = Flags::empty();
        flags |= Flags::PLACEMENT;
        flags |= Flags::UPDATE;
        assert!(flags.contains(Flags::PLACEMENT));
        assert!(flags.intersects(Flags::MUTATION_MASK));
        flags.remove(Flags::PLACEMENT | Flags::UPDATE);
        assert!(flags.is_empty());
        assert!(!Flags::PASSIVE.intersects(Flags::MUTATION_MASK));
    }

    #[test]
    fn test_highest_priority_lane() {
        let lanes = Lanes::DEFAULT | Lanes::INPUT_CONTINUOUS;
        assert_eq!(lanes.highest_priority(), Lanes::INPUT_CONTINUOUS);
        assert_eq!(Lanes::empty().highest_priority(), Lanes::empty());
        assert_eq!((Lanes::SYNC | Lanes::DEFAULT).highest_priority(), Lanes::SYNC);
    }
}
