//! Render pipeline
//!
//! Connects the description model to the host through the scheduler.
//!
//! # Pipeline Architecture
//!
//! ```text
//! render()/dispatch → root task (Immediate) → work loop → commit → layout effects
//!                                                                 ↘ passive task (Normal)
//! ```
//!
//! ## Data Flow
//!
//! 1. **stage** - `Renderer::render` stores the root's next description;
//!    a dispatch records the updated node. Either schedules the root once.
//! 2. **render** - the work loop builds the work-in-progress tree.
//! 3. **commit** - host mutations, then layout effects, then the root's
//!    revision signal bumps.
//! 4. **passive** - deferred effects run from their own task, or before the
//!    next render if that comes first.

pub mod mount;

pub use mount::{Renderer, PASSIVE_PRIORITY, ROOT_PRIORITY};
