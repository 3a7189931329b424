//! Commit engine.
//!
//! Takes a finished work-in-progress tree and makes the host match it.
//! Layout effects run in the same turn; deferred effects are handed back
//! to the pipeline, which flushes them from a lower-priority task.

mod commit;

pub(crate) use commit::{commit_mutation_effects, PassiveEffects};
