//! Depth-first render loop.
//!
//! Each unit of work begins on the way down and completes on the way up:
//!
//! ```text
//! begin(A) → begin(B) → complete(B) → begin(C) → complete(C) → complete(A)
//! ```
//!
//! The loop never holds the tree borrow across user code. Component bodies
//! run with the tree released, so a dispatch from inside a render only
//! queues an update.

use std::cell::RefCell;
use std::rc::Weak;

use tracing::{debug, trace};

use crate::element::Node;
use crate::engine::{create_work_in_progress, FiberId, FiberProps, FiberTree, MemoizedState, RootId};
use crate::error::Result;
use crate::hooks::UpdateScheduler;
use crate::host::HostConfig;

use super::complete::complete_work;
use super::ContextStack;

/// One render pass over a root.
pub(crate) struct WorkLoop<'a> {
    pub(super) tree: &'a RefCell<FiberTree>,
    pub(super) host: &'a dyn HostConfig,
    pub(super) updater: Weak<dyn UpdateScheduler>,
    pub(super) root: RootId,
    pub(super) contexts: ContextStack,
    /// The root has never committed; its children mount without tracking.
    pub(super) first_render: bool,
    work_in_progress: Option<FiberId>,
}

impl<'a> WorkLoop<'a> {
    pub(crate) fn new(
        tree: &'a RefCell<FiberTree>,
        host: &'a dyn HostConfig,
        updater: Weak<dyn UpdateScheduler>,
        root: RootId,
    ) -> Self {
        Self {
            tree,
            host,
            updater,
            root,
            contexts: ContextStack::new(),
            first_render: false,
            work_in_progress: None,
        }
    }

    /// Build the work-in-progress tree. Returns the finished root node.
    ///
    /// # Arguments
    ///
    /// * `element` - newly rendered root element, `None` to re-render the
    ///   last one
    pub(crate) fn render_root_sync(mut self, element: Option<Node>) -> Result<FiberId> {
        let root_fiber = self.prepare_fresh_stack(element)?;
        debug!(root = ?self.root, first = self.first_render, "render root");

        self.work_in_progress = Some(root_fiber);
        while let Some(unit) = self.work_in_progress {
            self.perform_unit_of_work(unit)?;
        }
        debug_assert_eq!(self.contexts.depth(), 0, "context stack not unwound");
        Ok(root_fiber)
    }

    fn prepare_fresh_stack(&mut self, element: Option<Node>) -> Result<FiberId> {
        let mut tree = self.tree.borrow_mut();
        let root = tree.root(self.root)?;
        let current = root.current;
        self.first_render = !root.has_committed;

        let wip = create_work_in_progress(&mut tree.arena, current, FiberProps::Empty);
        if let Some(element) = element {
            tree.arena[wip].memoized_state = MemoizedState::Root(element);
        }
        Ok(wip)
    }

    fn perform_unit_of_work(&mut self, unit: FiberId) -> Result<()> {
        let next = self.begin_work(unit)?;
        {
            let mut tree = self.tree.borrow_mut();
            let fiber = &mut tree.arena[unit];
            fiber.memoized_props = Some(fiber.pending_props.clone());
        }
        match next {
            Some(child) => self.work_in_progress = Some(child),
            None => self.complete_unit_of_work(unit)?,
        }
        Ok(())
    }

    fn complete_unit_of_work(&mut self, unit: FiberId) -> Result<()> {
        let mut tree = self.tree.borrow_mut();
        let mut completed = unit;
        loop {
            trace!(fiber = %completed, "complete work");
            complete_work(&mut tree.arena, self.host, &mut self.contexts, completed)?;

            let fiber = &tree.arena[completed];
            if let Some(sibling) = fiber.sibling {
                self.work_in_progress = Some(sibling);
                return Ok(());
            }
            match fiber.return_fiber {
                Some(parent) => completed = parent,
                None => {
                    self.work_in_progress = None;
                    return Ok(());
                }
            }
        }
    }
}
