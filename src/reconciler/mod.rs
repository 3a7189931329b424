//! Render phase.
//!
//! - `child` - child-list diff producing the next generation of nodes
//! - `begin` / `complete` - per-node work on the way down and up
//! - `work_loop` - the depth-first driver over one root
//! - `context` - provider value stack for the current pass
//!
//! Nothing here touches the attached host tree. Host nodes created during
//! complete stay detached until the commit engine places them.

mod begin;
mod child;
mod complete;
mod context;
mod work_loop;

pub use child::ChildReconciler;
pub use context::ContextStack;

pub(crate) use work_loop::WorkLoop;
