//! Render-tree engine - node storage and the dual-generation node model.
//!
//! The engine owns the data structures every other layer works on:
//! - Arena: generational index allocation for nodes
//! - Fiber: the unit of work / tree node, plus its constructors
//! - Flags: side-effect flags and update lanes
//! - Root: per-container records and the tree that owns them
//!
//! # Architecture
//!
//! Nodes are NOT objects linked by references. They are ids into one arena:
//!
//! ```text
//! #0 HostRoot      (child=#1, alternate=#4)
//! #1 App           (return=#0, child=#2)
//! #2 div           (return=#1, child=#3, state_node=Host(5))
//! #3 "count: 0"    (return=#2)
//! ```
//!
//! Parent, child, sibling and alternate links are plain `FiberId`s, so the
//! doubly-linked dual tree never fights the borrow checker.

mod arena;
mod fiber;
mod flags;
mod root;

pub use arena::*;
pub use fiber::*;
pub use flags::*;
pub use root::*;
