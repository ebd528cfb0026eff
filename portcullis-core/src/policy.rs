//! Lock decisions, free of I/O.

use chrono::{DateTime, Duration, Utc};

use crate::AttemptState;

/// What to persist after a failure has been counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Below threshold; the incremented count stands.
    NoLock(u32),
    /// Threshold reached; lock until the given time and reset the count.
    Lock { until: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    threshold: u32,
    lock_duration: Duration,
}

impl LockoutPolicy {
    pub fn new(threshold: u32, lock_duration: Duration) -> Self {
        Self {
            threshold,
            lock_duration,
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    /// End of the lock in force at `now`, if any.
    ///
    /// A lock counts only while it ends strictly after `now`; an expired lock
    /// reads as absent without being written back.
    pub fn active_lock(&self, state: &AttemptState, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        state.active_lock(now)
    }

    pub fn is_locked(&self, state: &AttemptState, now: DateTime<Utc>) -> bool {
        self.active_lock(state, now).is_some()
    }

    /// Decide on a failure given the post-increment count.
    pub fn on_failure(&self, failure_count: u32, now: DateTime<Utc>) -> Decision {
        if failure_count >= self.threshold {
            Decision::Lock {
                until: now + self.lock_duration,
            }
        } else {
            Decision::NoLock(failure_count)
        }
    }
}
