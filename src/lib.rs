//! # spark-fiber
//!
//! Fiber reconciliation runtime with a cooperative priority scheduler.
//!
//! Built on [spark-signals](https://github.com/RLabs-Inc/spark-signals): every
//! root exposes a commit revision signal so reactive code can follow commits.
//!
//! ## Architecture
//!
//! Components return immutable descriptions ([`Node`] trees). The renderer
//! diffs each new description against the committed render tree, builds a
//! work-in-progress generation node by node, then commits the difference to
//! a host adapter in one pass.
//!
//! ```text
//! Node description → work loop (begin/complete) → commit → HostConfig
//!         ▲                                          │
//!         └──────── hooks dispatch ◄── effects ◄─────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Dynamic values, callbacks, keys
//! - [`element`] - Description model and component descriptors
//! - [`scheduler`] - Priority task scheduler over a pluggable event loop
//! - [`engine`] - Render-tree model (arena, nodes, flags, roots)
//! - [`reconciler`] - Child diff, begin/complete work, work loop
//! - [`hooks`] - Per-node state slots and effects
//! - [`renderer`] - Commit engine
//! - [`host`] - Host adapter contract and an in-memory host
//! - [`pipeline`] - [`Renderer`], the public entry point

pub mod element;
pub mod engine;
pub mod error;
pub mod hooks;
pub mod host;
pub mod pipeline;
pub mod reconciler;
pub mod renderer;
pub mod scheduler;
pub mod types;

// Re-export commonly used items
pub use types::*;

pub use element::{
    event_name_of, event_prop_name, ClassComponent, ClassDef, Context, Element, ElementType,
    FunctionComponent, Node, Props,
};

pub use engine::{FiberId, Flags, Lanes, RootId, WorkTag};

pub use error::{ReconcileError, Result};

pub use hooks::{are_hook_inputs_equal, cleanup, Deps, Destroy, Dispatch, Hooks};

pub use host::{HostConfig, HostError, HostNode, HostOp, MemoryHost};

pub use pipeline::Renderer;

pub use scheduler::{
    Clock, EventLoop, LocalEventLoop, ManualClock, Priority, PriorityTimeouts, Scheduler,
    SchedulerConfig, SystemClock, Task, TaskCallback,
};
