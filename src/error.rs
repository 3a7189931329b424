//! Reconciler errors.

use thiserror::Error;

use crate::engine::{RootId, WorkTag};
use crate::host::HostError;

/// Fatal failures of a render or commit.
///
/// A render error leaves the committed tree untouched; the next update
/// starts a fresh work-in-progress tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReconcileError {
    /// A host node needed a host-capable ancestor and none was found.
    #[error("no host parent above a {0:?} node")]
    MissingHostParent(WorkTag),

    /// A node's payload did not match its tag.
    #[error("{tag:?} node carries an unexpected payload during {phase}")]
    UnexpectedPayload { tag: WorkTag, phase: &'static str },

    /// A host node was committed before complete work created its native node.
    #[error("{0:?} node has no native node")]
    MissingHostNode(WorkTag),

    #[error("unknown root {0:?}")]
    UnknownRoot(RootId),

    /// `flush_sync` was called while a render was already running.
    #[error("render requested while rendering")]
    ReentrantRender,

    #[error(transparent)]
    Host(#[from] HostError),
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
