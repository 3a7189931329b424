//! Cooperative priority scheduler.
//!
//! Tasks carry a priority and an expiration time (`start + timeout`). Ready
//! tasks wait in a min-heap ordered by expiration, delayed tasks in a second
//! heap ordered by start time. Work runs in slices posted to the host
//! [`EventLoop`]:
//!
//! ```text
//! schedule_callback ──► task_queue ──► post(perform_work_until_deadline)
//!        │ (delay)          ▲                    │
//!        ▼                  │                    ▼
//!   timer_queue ──advance_timers──┘          work_loop
//!        │                                  ├─ expired? run regardless
//!        └─ after(start - now, handle_timeout)  └─ slice spent? yield + re-post
//! ```
//!
//! A task whose expiration has passed always runs, even when the slice is
//! spent. A task that returns a continuation stays queued with the same
//! priority and expiration.

mod event_loop;
mod priority;
mod queue;

pub use event_loop::*;
pub use priority::*;
pub use queue::{Task, TaskCallback};

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use queue::{TaskInner, TaskQueue};
use crate::types::Millis;

// =============================================================================
// State
// =============================================================================

struct SchedulerState {
    config: SchedulerConfig,
    task_queue: TaskQueue,
    timer_queue: TaskQueue,
    next_task_id: u64,

    current_task: Option<Task>,
    current_priority: Priority,

    /// Start of the current slice; `should_yield` measures from here.
    slice_start: Millis,

    is_performing_work: bool,
    is_host_callback_scheduled: bool,
    is_host_timeout_scheduled: bool,
    is_message_loop_running: bool,
    timeout_id: Option<TimerId>,
}

impl SchedulerState {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            task_queue: TaskQueue::default(),
            timer_queue: TaskQueue::default(),
            next_task_id: 1,
            current_task: None,
            current_priority: Priority::Normal,
            slice_start: -1.0,
            is_performing_work: false,
            is_host_callback_scheduled: false,
            is_host_timeout_scheduled: false,
            is_message_loop_running: false,
            timeout_id: None,
        }
    }

    /// Move delayed tasks whose start time has arrived into the ready queue.
    fn advance_timers(&mut self, current_time: Millis) {
        while let Some(timer) = self.timer_queue.peek() {
            let (done, start_time) = (timer.is_done(), timer.start_time());
            if done {
                self.timer_queue.pop();
            } else if start_time <= current_time {
                if let Some(timer) = self.timer_queue.pop() {
                    timer.0.sort_index.set(timer.expiration_time());
                    self.task_queue.push(timer);
                }
            } else {
                return;
            }
        }
    }
}

struct SchedulerInner {
    state: RefCell<SchedulerState>,
    event_loop: Rc<dyn EventLoop>,
    self_weak: Weak<SchedulerInner>,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Handle to a scheduler. Clones share the same queues.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(event_loop: Rc<dyn EventLoop>) -> Self {
        Self::with_config(event_loop, SchedulerConfig::default())
    }

    pub fn with_config(event_loop: Rc<dyn EventLoop>, config: SchedulerConfig) -> Self {
        let inner = Rc::new_cyclic(|weak| SchedulerInner {
            state: RefCell::new(SchedulerState::new(config)),
            event_loop,
            self_weak: weak.clone(),
        });
        Self { inner }
    }

    pub fn now(&self) -> Millis {
        self.inner.event_loop.now()
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.state.borrow().config
    }

    /// Queue `callback` to run as soon as the loop gets to it.
    pub fn schedule_callback(&self, priority: Priority, callback: TaskCallback) -> Task {
        self.inner.schedule(priority, callback, 0.0)
    }

    /// Queue `callback` to become ready after `delay` ms.
    pub fn schedule_delayed_callback(
        &self,
        priority: Priority,
        callback: TaskCallback,
        delay: Millis,
    ) -> Task {
        self.inner.schedule(priority, callback, delay)
    }

    /// Drop the task's callback. The task is removed lazily when it reaches
    /// the top of its heap.
    pub fn cancel_callback(&self, task: &Task) {
        task.0.callback.borrow_mut().take();
        trace!(task = task.id(), "task cancelled");
    }

    /// Priority of the running task, or of the enclosing `run_with_priority`.
    pub fn current_priority(&self) -> Priority {
        self.inner.state.borrow().current_priority
    }

    /// True once the current slice has used its frame budget.
    pub fn should_yield(&self) -> bool {
        self.inner.should_yield_to_host()
    }

    /// Run `f` with `priority` as the current priority.
    pub fn run_with_priority<R>(&self, priority: Priority, f: impl FnOnce() -> R) -> R {
        let previous = std::mem::replace(
            &mut self.inner.state.borrow_mut().current_priority,
            priority,
        );
        let _restore = PriorityGuard {
            inner: &self.inner,
            previous,
        };
        f()
    }

    /// Set the slice budget from a target frame rate. `0` restores the
    /// default; values outside `0..=125` are rejected.
    pub fn force_frame_rate(&self, fps: f64) {
        if !(0.0..=125.0).contains(&fps) {
            warn!(fps, "force_frame_rate supports 0..=125 fps, ignoring");
            return;
        }
        let interval = if fps > 0.0 {
            (1000.0 / fps).floor()
        } else {
            DEFAULT_FRAME_INTERVAL
        };
        self.inner.state.borrow_mut().config.frame_interval = interval;
    }

    /// Tasks still held by the queues, including cancelled ones not yet
    /// dropped.
    pub fn queued(&self) -> usize {
        let state = self.inner.state.borrow();
        state.task_queue.len() + state.timer_queue.len()
    }

    /// Task currently executing, if any.
    pub fn current_task(&self) -> Option<Task> {
        self.inner.state.borrow().current_task.clone()
    }
}

impl SchedulerInner {
    fn schedule(&self, priority: Priority, callback: TaskCallback, delay: Millis) -> Task {
        let current_time = self.event_loop.now();
        let start_time = if delay > 0.0 {
            current_time + delay
        } else {
            current_time
        };

        let mut state = self.state.borrow_mut();
        let expiration_time = start_time + state.config.timeouts.timeout(priority);
        let id = state.next_task_id;
        state.next_task_id += 1;

        let task = Task(Rc::new(TaskInner {
            id,
            callback: RefCell::new(Some(callback)),
            priority,
            start_time,
            expiration_time,
            sort_index: Cell::new(-1.0),
        }));

        if start_time > current_time {
            task.0.sort_index.set(start_time);
            state.timer_queue.push(task.clone());
            let is_first_timer = state.task_queue.is_empty()
                && state.timer_queue.peek().is_some_and(|t| t.ptr_eq(&task));
            if is_first_timer {
                if state.is_host_timeout_scheduled {
                    self.cancel_host_timeout(&mut state);
                }
                self.request_host_timeout(&mut state, start_time - current_time);
            }
        } else {
            task.0.sort_index.set(expiration_time);
            state.task_queue.push(task.clone());
            if !state.is_host_callback_scheduled && !state.is_performing_work {
                state.is_host_callback_scheduled = true;
                self.request_host_callback(&mut state);
            }
        }

        trace!(task = id, ?priority, start_time, expiration_time, "task scheduled");
        task
    }

    fn should_yield_to_host(&self) -> bool {
        let state = self.state.borrow();
        self.event_loop.now() - state.slice_start >= state.config.frame_interval
    }

    // =========================================================================
    // Host plumbing
    // =========================================================================

    fn request_host_callback(&self, state: &mut SchedulerState) {
        if !state.is_message_loop_running {
            state.is_message_loop_running = true;
            self.schedule_perform_work_until_deadline();
        }
    }

    fn schedule_perform_work_until_deadline(&self) {
        let weak = self.self_weak.clone();
        self.event_loop.post(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.perform_work_until_deadline();
            }
        }));
    }

    fn request_host_timeout(&self, state: &mut SchedulerState, ms: Millis) {
        let weak = self.self_weak.clone();
        state.is_host_timeout_scheduled = true;
        state.timeout_id = Some(self.event_loop.after(
            ms,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let now = inner.event_loop.now();
                    inner.handle_timeout(now);
                }
            }),
        ));
    }

    fn cancel_host_timeout(&self, state: &mut SchedulerState) {
        state.is_host_timeout_scheduled = false;
        if let Some(id) = state.timeout_id.take() {
            self.event_loop.cancel(id);
        }
    }

    fn handle_timeout(&self, current_time: Millis) {
        let mut state = self.state.borrow_mut();
        state.is_host_timeout_scheduled = false;
        state.timeout_id = None;
        state.advance_timers(current_time);

        if state.is_host_callback_scheduled {
            return;
        }
        if !state.task_queue.is_empty() {
            state.is_host_callback_scheduled = true;
            self.request_host_callback(&mut state);
        } else if let Some(start_time) = state.timer_queue.peek().map(Task::start_time) {
            self.request_host_timeout(&mut state, start_time - current_time);
        }
    }

    // =========================================================================
    // Work loop
    // =========================================================================

    fn perform_work_until_deadline(&self) {
        let current_time = self.event_loop.now();
        {
            let mut state = self.state.borrow_mut();
            if !state.is_message_loop_running {
                return;
            }
            state.slice_start = current_time;
        }

        // Re-posts if flush_work panics or reports remaining work
        let mut guard = MessageLoopGuard {
            inner: self,
            has_more_work: true,
        };
        guard.has_more_work = self.flush_work(current_time);
    }

    fn flush_work(&self, initial_time: Millis) -> bool {
        let previous_priority = {
            let mut state = self.state.borrow_mut();
            state.is_host_callback_scheduled = false;
            if state.is_host_timeout_scheduled {
                self.cancel_host_timeout(&mut state);
            }
            state.is_performing_work = true;
            state.current_priority
        };

        let _guard = FlushGuard {
            inner: self,
            previous_priority,
        };
        self.work_loop(initial_time)
    }

    /// Returns true when work remains.
    fn work_loop(&self, initial_time: Millis) -> bool {
        let mut current_time = initial_time;
        self.state.borrow_mut().advance_timers(current_time);

        loop {
            let task = {
                let mut state = self.state.borrow_mut();
                let task = state.task_queue.peek().cloned();
                state.current_task = task.clone();
                task
            };
            let Some(task) = task else {
                break;
            };

            if task.expiration_time() > current_time && self.should_yield_to_host() {
                trace!(task = task.id(), "yielding to host");
                return true;
            }

            let callback = task.0.callback.borrow_mut().take();
            let Some(callback) = callback else {
                // Cancelled
                self.state.borrow_mut().task_queue.pop();
                continue;
            };

            let did_timeout = task.expiration_time() <= current_time;
            self.state.borrow_mut().current_priority = task.priority();
            trace!(task = task.id(), did_timeout, "running task");

            let continuation = callback.call(did_timeout);
            current_time = self.event_loop.now();

            let mut state = self.state.borrow_mut();
            match continuation {
                Some(next) => {
                    *task.0.callback.borrow_mut() = Some(next);
                }
                None => {
                    if state.task_queue.peek().is_some_and(|t| t.ptr_eq(&task)) {
                        state.task_queue.pop();
                    }
                }
            }
            state.advance_timers(current_time);
        }

        let mut state = self.state.borrow_mut();
        if let Some(start_time) = state.timer_queue.peek().map(Task::start_time) {
            self.request_host_timeout(&mut state, start_time - current_time);
        }
        false
    }
}

// =============================================================================
// Guards
// =============================================================================

struct MessageLoopGuard<'a> {
    inner: &'a SchedulerInner,
    has_more_work: bool,
}

impl Drop for MessageLoopGuard<'_> {
    fn drop(&mut self) {
        if self.has_more_work {
            self.inner.schedule_perform_work_until_deadline();
        } else if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            state.is_message_loop_running = false;
        }
    }
}

struct FlushGuard<'a> {
    inner: &'a SchedulerInner,
    previous_priority: Priority,
}

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            state.current_task = None;
            state.current_priority = self.previous_priority;
            state.is_performing_work = false;
        }
    }
}

struct PriorityGuard<'a> {
    inner: &'a SchedulerInner,
    previous: Priority,
}

impl Drop for PriorityGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.try_borrow_mut() {
            state.current_priority = self.previous;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Log = Rc<RefCell<Vec<u32>>>;

    fn setup() -> (Rc<LocalEventLoop<ManualClock>>, Scheduler, Log) {
        let ev = Rc::new(LocalEventLoop::new(ManualClock::new()));
        let scheduler = Scheduler::new(ev.clone());
        (ev, scheduler, Rc::new(RefCell::new(Vec::new())))
    }

    fn push(log: &Log, n: u32) -> TaskCallback {
        let log = log.clone();
        TaskCallback::once(move || log.borrow_mut().push(n))
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    #[test]
    fn test_equal_priority_runs_fifo() {
        let (ev, scheduler, log) = setup();
        for n in 0..4 {
            scheduler.schedule_callback(Priority::Normal, push(&log, n));
        }
        ev.run_until_idle();
        assert_eq!(*log.borrow(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_earlier_expiration_runs_first() {
        let (ev, scheduler, log) = setup();
        scheduler.schedule_callback(Priority::Low, push(&log, 1));
        scheduler.schedule_callback(Priority::Normal, push(&log, 2));
        scheduler.schedule_callback(Priority::UserBlocking, push(&log, 3));
        scheduler.schedule_callback(Priority::Immediate, push(&log, 4));
        ev.run_until_idle();
        assert_eq!(*log.borrow(), vec![4, 3, 2, 1]);
    }

    #[test]
    fn test_schedule_posts_once() {
        let (ev, scheduler, log) = setup();
        scheduler.schedule_callback(Priority::Normal, push(&log, 1));
        scheduler.schedule_callback(Priority::Normal, push(&log, 2));
        assert_eq!(ev.run_pending(), 1);
        assert_eq!(log.borrow().len(), 2);
    }

    // =========================================================================
    // Yielding
    // =========================================================================

    #[test]
    fn test_non_expired_task_yields_after_slice() {
        let (ev, scheduler, log) = setup();
        let clock_ev = ev.clone();
        let l = log.clone();
        scheduler.schedule_callback(
            Priority::Normal,
            TaskCallback::once(move || {
                clock_ev.clock().advance(6.0);
                l.borrow_mut().push(1);
            }),
        );
        scheduler.schedule_callback(Priority::Normal, push(&log, 2));

        assert!(ev.run_next());
        assert_eq!(*log.borrow(), vec![1]);
        // Yielded and re-posted itself
        assert!(ev.has_posted());
        ev.run_next();
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_expired_tasks_run_regardless_of_slice() {
        let (ev, scheduler, log) = setup();
        let clock_ev = ev.clone();
        let l = log.clone();
        scheduler.schedule_callback(
            Priority::Immediate,
            TaskCallback::once(move || {
                clock_ev.clock().advance(50.0);
                l.borrow_mut().push(1);
            }),
        );
        scheduler.schedule_callback(Priority::Immediate, push(&log, 2));

        assert!(ev.run_next());
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_did_timeout_flag() {
        let (ev, scheduler, _) = setup();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for priority in [Priority::Immediate, Priority::Normal] {
            let seen = seen.clone();
            scheduler.schedule_callback(
                priority,
                TaskCallback::new(move |did_timeout| {
                    seen.borrow_mut().push(did_timeout);
                    None
                }),
            );
        }
        ev.run_until_idle();
        assert_eq!(*seen.borrow(), vec![true, false]);
    }

    fn chunked(scheduler: Scheduler, ev: Rc<LocalEventLoop<ManualClock>>, done: Rc<Cell<u32>>, total: u32) -> TaskCallback {
        TaskCallback::new(move |_| {
            while done.get() < total && !scheduler.should_yield() {
                ev.clock().advance(1.0);
                done.set(done.get() + 1);
            }
            if done.get() < total {
                Some(chunked(scheduler, ev, done, total))
            } else {
                None
            }
        })
    }

    #[test]
    fn test_continuation_resumes_in_next_slice() {
        let (ev, scheduler, _) = setup();
        let done = Rc::new(Cell::new(0));
        let task = scheduler.schedule_callback(
            Priority::Normal,
            chunked(scheduler.clone(), ev.clone(), done.clone(), 12),
        );

        ev.run_next();
        assert_eq!(done.get(), 5);
        assert!(!task.is_done());
        assert_eq!(scheduler.queued(), 1);

        ev.run_until_idle();
        assert_eq!(done.get(), 12);
        assert!(task.is_done());
        assert_eq!(scheduler.queued(), 0);
    }

    // =========================================================================
    // Delays, cancellation, priority
    // =========================================================================

    #[test]
    fn test_delayed_task_waits_for_start_time() {
        let (ev, scheduler, log) = setup();
        scheduler.schedule_delayed_callback(Priority::Normal, push(&log, 1), 100.0);
        scheduler.schedule_callback(Priority::Normal, push(&log, 2));

        ev.run_pending();
        assert_eq!(*log.borrow(), vec![2]);
        assert_eq!(ev.pending_timers(), 1);

        ev.run_until_idle();
        assert_eq!(*log.borrow(), vec![2, 1]);
        assert_eq!(ev.now(), 100.0);
    }

    #[test]
    fn test_earlier_timer_replaces_host_timeout() {
        let (ev, scheduler, log) = setup();
        scheduler.schedule_delayed_callback(Priority::Normal, push(&log, 1), 100.0);
        scheduler.schedule_delayed_callback(Priority::Normal, push(&log, 2), 10.0);
        assert_eq!(ev.pending_timers(), 1);
        ev.run_until_idle();
        assert_eq!(*log.borrow(), vec![2, 1]);
    }

    #[test]
    fn test_cancelled_task_never_runs() {
        let (ev, scheduler, log) = setup();
        let task = scheduler.schedule_callback(Priority::Normal, push(&log, 1));
        scheduler.schedule_callback(Priority::Normal, push(&log, 2));
        scheduler.cancel_callback(&task);
        assert!(task.is_done());
        ev.run_until_idle();
        assert_eq!(*log.borrow(), vec![2]);
        assert_eq!(scheduler.queued(), 0);
    }

    #[test]
    fn test_current_priority_during_task() {
        let (ev, scheduler, _) = setup();
        let seen = Rc::new(Cell::new(Priority::Idle));
        let s = scheduler.clone();
        let seen2 = seen.clone();
        scheduler.schedule_callback(
            Priority::UserBlocking,
            TaskCallback::once(move || seen2.set(s.current_priority())),
        );
        assert_eq!(scheduler.current_priority(), Priority::Normal);
        ev.run_until_idle();
        assert_eq!(seen.get(), Priority::UserBlocking);
        assert_eq!(scheduler.current_priority(), Priority::Normal);
    }

    #[test]
    fn test_run_with_priority_restores() {
        let (_, scheduler, _) = setup();
        let inner = scheduler.run_with_priority(Priority::Low, || scheduler.current_priority());
        assert_eq!(inner, Priority::Low);
        assert_eq!(scheduler.current_priority(), Priority::Normal);
    }

    #[test]
    fn test_force_frame_rate() {
        let (_, scheduler, _) = setup();
        scheduler.force_frame_rate(60.0);
        assert_eq!(scheduler.config().frame_interval, 16.0);
        scheduler.force_frame_rate(500.0);
        assert_eq!(scheduler.config().frame_interval, 16.0);
        scheduler.force_frame_rate(0.0);
        assert_eq!(scheduler.config().frame_interval, DEFAULT_FRAME_INTERVAL);
    }

    #[test]
    fn test_panicking_task_does_not_wedge_scheduler() {
        let (ev, scheduler, log) = setup();
        scheduler.schedule_callback(
            Priority::Immediate,
            TaskCallback::once(|| panic!("task failed")),
        );
        scheduler.schedule_callback(Priority::Normal, push(&log, 2));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| ev.run_next()));
        assert!(result.is_err());
        assert_eq!(scheduler.current_priority(), Priority::Normal);
        assert!(scheduler.current_task().is_none());

        ev.run_until_idle();
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn test_task_scheduled_from_task_runs_same_slice() {
        let (ev, scheduler, log) = setup();
        let s = scheduler.clone();
        let l = log.clone();
        scheduler.schedule_callback(
            Priority::Normal,
            TaskCallback::once(move || {
                l.borrow_mut().push(1);
                s.schedule_callback(Priority::Normal, push(&l, 2));
            }),
        );
        assert_eq!(ev.run_pending(), 1);
        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    // =========================================================================
    // Properties
    // =========================================================================

    proptest! {
        #[test]
        fn prop_runs_in_expiration_then_submission_order(levels in proptest::collection::vec(0usize..5, 1..40)) {
            let (ev, scheduler, log) = setup();
            for (n, level) in levels.iter().enumerate() {
                scheduler.schedule_callback(Priority::ALL[*level], push(&log, n as u32));
            }
            ev.run_until_idle();

            let timeouts = PriorityTimeouts::default();
            let mut expected: Vec<(usize, u32)> = levels
                .iter()
                .enumerate()
                .map(|(n, level)| (*level, n as u32))
                .collect();
            expected.sort_by(|a, b| {
                timeouts
                    .timeout(Priority::ALL[a.0])
                    .total_cmp(&timeouts.timeout(Priority::ALL[b.0]))
                    .then(a.1.cmp(&b.1))
            });
            let expected: Vec<u32> = expected.into_iter().map(|(_, n)| n).collect();
            prop_assert_eq!(log.borrow().clone(), expected);
        }
    }
}
