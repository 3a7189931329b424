//! Host event loop abstraction.
//!
//! The scheduler never runs work inline: it posts a job ("message") to the
//! event loop and arms timers for delayed tasks. [`LocalEventLoop`] is a
//! single-threaded implementation driven explicitly by its owner, generic
//! over a [`Clock`] so tests can run on virtual time.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::types::Millis;

/// A job posted to the loop.
pub type Job = Box<dyn FnOnce()>;

/// Handle to an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

/// What the scheduler needs from its host.
pub trait EventLoop {
    /// Monotonic time in ms.
    fn now(&self) -> Millis;

    /// Run `job` on a later turn of the loop.
    fn post(&self, job: Job);

    /// Run `job` once `delay` ms have elapsed.
    fn after(&self, delay: Millis, job: Job) -> TimerId;

    fn cancel(&self, timer: TimerId);
}

// =============================================================================
// Clocks
// =============================================================================

pub trait Clock {
    fn now(&self) -> Millis;

    /// Block (or, for virtual clocks, jump) until `deadline`.
    fn wait_until(&self, deadline: Millis);
}

/// Wall clock measured from creation.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Millis {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }

    fn wait_until(&self, deadline: Millis) {
        let remaining = deadline - self.now();
        if remaining > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(remaining / 1000.0));
        }
    }
}

/// Virtual clock; time moves only when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Millis>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: Millis) {
        self.now.set(self.now.get() + ms);
    }

    pub fn set(&self, ms: Millis) {
        self.now.set(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.now.get()
    }

    fn wait_until(&self, deadline: Millis) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

// =============================================================================
// LocalEventLoop
// =============================================================================

struct PendingTimer {
    id: TimerId,
    deadline: Millis,
    job: Job,
}

/// Single-threaded event loop.
pub struct LocalEventLoop<C: Clock = SystemClock> {
    clock: C,
    posted: RefCell<VecDeque<Job>>,
    timers: RefCell<Vec<PendingTimer>>,
    next_timer: Cell<u64>,
}

impl<C: Clock> LocalEventLoop<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            posted: RefCell::new(VecDeque::new()),
            timers: RefCell::new(Vec::new()),
            next_timer: Cell::new(0),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run one posted job. Returns false when none was queued.
    pub fn run_next(&self) -> bool {
        // Pop before running: the job may post more work
        let job = self.posted.borrow_mut().pop_front();
        match job {
            Some(job) => {
                job();
                true
            }
            None => false,
        }
    }

    /// Run posted jobs until the queue is empty. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Fire every timer whose deadline has passed, earliest first.
    pub fn run_due_timers(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.take_due_timer() {
            job();
            ran += 1;
        }
        ran
    }

    /// Drain posted jobs and timers, waiting on the clock for the next
    /// deadline when nothing else is runnable. Returns how many jobs ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            ran += self.run_pending();
            ran += self.run_due_timers();
            if self.has_posted() {
                continue;
            }
            match self.next_deadline() {
                Some(deadline) => self.clock.wait_until(deadline),
                None => return ran,
            }
        }
    }

    pub fn has_posted(&self) -> bool {
        !self.posted.borrow().is_empty()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    fn next_deadline(&self) -> Option<Millis> {
        self.timers
            .borrow()
            .iter()
            .map(|t| t.deadline)
            .min_by(|a, b| a.total_cmp(b))
    }

    fn take_due_timer(&self) -> Option<Job> {
        let now = self.clock.now();
        let mut timers = self.timers.borrow_mut();
        let (pos, _) = timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.deadline <= now)
            .min_by(|(_, a), (_, b)| a.deadline.total_cmp(&b.deadline))?;
        Some(timers.remove(pos).job)
    }
}

impl<C: Clock> EventLoop for LocalEventLoop<C> {
    fn now(&self) -> Millis {
        self.clock.now()
    }

    fn post(&self, job: Job) {
        self.posted.borrow_mut().push_back(job);
    }

    fn after(&self, delay: Millis, job: Job) -> TimerId {
        let id = TimerId(self.next_timer.get());
        self.next_timer.set(id.0 + 1);
        self.timers.borrow_mut().push(PendingTimer {
            id,
            deadline: self.clock.now() + delay.max(0.0),
            job,
        });
        id
    }

    fn cancel(&self, timer: TimerId) {
        self.timers.borrow_mut().retain(|t| t.id != timer);
    }
}
