//! Tasks and the min-heap they wait in.
//!
//! Ordering key is `(sort_index, id)`: ready tasks sort by expiration,
//! delayed tasks by start time, and the monotonically increasing id keeps
//! equal keys FIFO.

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::rc::Rc;

use super::Priority;
use crate::types::Millis;

// =============================================================================
// TaskCallback
// =============================================================================

/// Work unit run by the scheduler.
///
/// Receives `did_timeout` (the task's expiration has passed) and may return
/// a continuation, which keeps the task queued with the same priority and
/// expiration.
pub struct TaskCallback(Box<dyn FnOnce(bool) -> Option<TaskCallback>>);

impl TaskCallback {
    pub fn new(f: impl FnOnce(bool) -> Option<TaskCallback> + 'static) -> Self {
        Self(Box::new(f))
    }

    /// A callback that never continues.
    pub fn once(f: impl FnOnce() + 'static) -> Self {
        Self::new(move |_| {
            f();
            None
        })
    }

    pub(crate) fn call(self, did_timeout: bool) -> Option<TaskCallback> {
        (self.0)(did_timeout)
    }
}

impl fmt::Debug for TaskCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TaskCallback")
    }
}

// =============================================================================
// Task
// =============================================================================

pub(crate) struct TaskInner {
    pub(crate) id: u64,
    pub(crate) callback: RefCell<Option<TaskCallback>>,
    pub(crate) priority: Priority,
    pub(crate) start_time: Millis,
    pub(crate) expiration_time: Millis,
    pub(crate) sort_index: Cell<Millis>,
}

/// Handle to a scheduled task. Clones refer to the same task.
#[derive(Clone)]
pub struct Task(pub(crate) Rc<TaskInner>);

impl Task {
    pub fn id(&self) -> u64 {
        self.0.id
    }

    pub fn priority(&self) -> Priority {
        self.0.priority
    }

    pub fn start_time(&self) -> Millis {
        self.0.start_time
    }

    pub fn expiration_time(&self) -> Millis {
        self.0.expiration_time
    }

    /// True once cancelled or finished.
    pub fn is_done(&self) -> bool {
        self.0.callback.borrow().is_none()
    }

    pub(crate) fn ptr_eq(&self, other: &Task) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id)
            .field("priority", &self.0.priority)
            .field("start_time", &self.0.start_time)
            .field("expiration_time", &self.0.expiration_time)
            .finish()
    }
}

// =============================================================================
// Heap
// =============================================================================

struct Entry {
    sort_index: Millis,
    id: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, the queue wants the minimum.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .sort_index
            .total_cmp(&self.sort_index)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Min-heap of tasks keyed by `(sort_index, id)`.
#[derive(Default)]
pub(crate) struct TaskQueue {
    heap: BinaryHeap<Entry>,
}

impl TaskQueue {
    pub(crate) fn push(&mut self, task: Task) {
        self.heap.push(Entry {
            sort_index: task.0.sort_index.get(),
            id: task.0.id,
            task,
        });
    }

    pub(crate) fn peek(&self) -> Option<&Task> {
        self.heap.peek().map(|e| &e.task)
    }

    pub(crate) fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|e| e.task)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: u64, sort_index: Millis) -> Task {
        Task(Rc::new(TaskInner {
            id,
            callback: RefCell::new(Some(TaskCallback::once(|| {}))),
            priority: Priority::Normal,
            start_time: 0.0,
            expiration_time: sort_index,
            sort_index: Cell::new(sort_index),
        }))
    }

    #[test]
    fn test_pops_minimum_first() {
        let mut q = TaskQueue::default();
        q.push(task(1, 30.0));
        q.push(task(2, 10.0));
        q.push(task(3, 20.0));
        let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.id()).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_equal_sort_index_is_fifo() {
        let mut q = TaskQueue::default();
        q.push(task(5, 1.0));
        q.push(task(3, 1.0));
        q.push(task(4, 1.0));
        let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.id()).collect();
        assert_eq!(order, vec![3, 4, 5]);
    }

    #[test]
    fn test_negative_sort_index_first() {
        let mut q = TaskQueue::default();
        q.push(task(1, 0.0));
        q.push(task(2, -1.0));
        assert_eq!(q.peek().map(|t| t.id()), Some(2));
        assert_eq!(q.len(), 2);
    }
}
