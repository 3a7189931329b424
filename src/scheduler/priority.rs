//! Priority levels and scheduler configuration.

use crate::types::Millis;

/// Task priority. Lower discriminant is more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Immediate = 1,
    UserBlocking = 2,
    #[default]
    Normal = 3,
    Low = 4,
    Idle = 5,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Immediate,
        Priority::UserBlocking,
        Priority::Normal,
        Priority::Low,
        Priority::Idle,
    ];
}

/// Default time slice before a non-expired task must yield.
pub const DEFAULT_FRAME_INTERVAL: Millis = 5.0;

/// Max 31-bit signed integer; effectively "never".
pub const MAX_SIGNED_31_BIT: Millis = 1_073_741_823.0;

/// Timeout per priority. A task's expiration is `start + timeout`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityTimeouts {
    pub immediate: Millis,
    pub user_blocking: Millis,
    pub normal: Millis,
    pub low: Millis,
    pub idle: Millis,
}

impl Default for PriorityTimeouts {
    fn default() -> Self {
        Self {
            // Already expired the moment it is scheduled
            immediate: -1.0,
            user_blocking: 250.0,
            normal: 5000.0,
            low: 10000.0,
            idle: MAX_SIGNED_31_BIT,
        }
    }
}

impl PriorityTimeouts {
    pub fn timeout(&self, priority: Priority) -> Millis {
        match priority {
            Priority::Immediate => self.immediate,
            Priority::UserBlocking => self.user_blocking,
            Priority::Normal => self.normal,
            Priority::Low => self.low,
            Priority::Idle => self.idle,
        }
    }
}

/// Scheduler tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Slice budget in ms.
    pub frame_interval: Millis,
    pub timeouts: PriorityTimeouts,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frame_interval: DEFAULT_FRAME_INTERVAL,
            timeouts: PriorityTimeouts::default(),
        }
    }
}
