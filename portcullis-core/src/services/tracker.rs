//! Per-principal failure tracking with timed lockout.
//!
//! A [`LoginAttemptTracker`] binds one principal to a store and a
//! [`LockoutPolicy`]. The gate builds two per request, one for the account
//! and one for the network origin, from the same generic type.
//!
//! Each principal cycles between two states:
//!
//! - `Unlocked(count)`: a failure moves to `Unlocked(count + 1)`, or to
//!   `Locked(now + duration)` when `count + 1` reaches the threshold
//! - `Locked(until)`: failures are not counted; once `until` has passed it
//!   reads as `Unlocked(0)` without anything being written
//!
//! A success moves any state to `Unlocked(0)`.
//!
//! # Example
//!
//! ```rust,ignore
//! let tracker = LoginAttemptTracker::new(store, clock, Principal::account("a@x.com"), policy);
//!
//! if let LockStatus::LockedUntil(until) = tracker.check_locked().await? {
//!     // reject without checking the password
//! }
//!
//! let status = tracker.record_failure(Some("Mozilla/5.0")).await?;
//! ```

use std::sync::Arc;

use crate::{
    Clock, Error, LockStatus, LockoutStatus, Principal,
    policy::{Decision, LockoutPolicy},
    repositories::AttemptStore,
};

/// Tracks consecutive failures for a single principal.
///
/// Cheap to construct: it only clones two `Arc`s and the principal. All
/// shared state lives in the store, so concurrent trackers for the same
/// principal stay consistent.
pub struct LoginAttemptTracker<S: AttemptStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    principal: Principal,
    policy: LockoutPolicy,
    enabled: bool,
}

impl<S: AttemptStore> LoginAttemptTracker<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        principal: Principal,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            principal,
            policy,
            enabled: true,
        }
    }

    /// Turn counting and locking on or off. A disabled tracker never reads
    /// the store and always reports unlocked.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    /// Whether the principal is locked right now.
    ///
    /// An expired lock reads as unlocked; nothing is written.
    pub async fn check_locked(&self) -> Result<LockStatus, Error> {
        if !self.enabled {
            return Ok(LockStatus::Unlocked);
        }

        let state = self.store.get_state(&self.principal).await?;
        Ok(match self.policy.active_lock(&state, self.clock.now()) {
            Some(until) => LockStatus::LockedUntil(until),
            None => LockStatus::Unlocked,
        })
    }

    /// Current failure count and active lock, if any.
    pub async fn status(&self) -> Result<LockoutStatus, Error> {
        if !self.enabled {
            return Ok(LockoutStatus {
                principal: self.principal.clone(),
                failed_attempts: 0,
                locked_until: None,
            });
        }

        let state = self.store.get_state(&self.principal).await?;
        Ok(LockoutStatus {
            principal: self.principal.clone(),
            failed_attempts: state.failure_count,
            locked_until: self.policy.active_lock(&state, self.clock.now()),
        })
    }

    /// Count a failure and lock the principal if it reached the threshold.
    ///
    /// A failure arriving while a lock is active (e.g. a request that passed
    /// [`check_locked`](Self::check_locked) just before another one locked the
    /// principal) is not counted and leaves the lock untouched. Returns
    /// `LockedUntil` whenever the principal is locked afterwards.
    pub async fn record_failure(&self, context: Option<&str>) -> Result<LockStatus, Error> {
        if !self.enabled {
            return Ok(LockStatus::Unlocked);
        }

        let now = self.clock.now();
        let state = self
            .store
            .increment_failure(&self.principal, context, now)
            .await?;

        if let Some(until) = self.policy.active_lock(&state, now) {
            tracing::debug!(
                principal = %self.principal,
                locked_until = %until,
                "Failed login attempt while locked, not counted"
            );
            return Ok(LockStatus::LockedUntil(until));
        }

        match self.policy.on_failure(state.failure_count, now) {
            Decision::NoLock(count) => {
                tracing::debug!(
                    principal = %self.principal,
                    failed_attempts = count,
                    threshold = self.policy.threshold(),
                    "Recorded failed login attempt"
                );
                Ok(LockStatus::Unlocked)
            }
            Decision::Lock { until } => {
                self.store.set_lock(&self.principal, until).await?;
                tracing::warn!(
                    principal = %self.principal,
                    locked_until = %until,
                    "Too many failed login attempts, locking"
                );
                Ok(LockStatus::LockedUntil(until))
            }
        }
    }

    /// Clear the count and any lock after a successful sign-in.
    pub async fn record_success(&self) -> Result<(), Error> {
        self.store.reset(&self.principal).await
    }

    /// Clear the count and any lock (e.g., after a password reset).
    ///
    /// Returns `true` if the principal was locked.
    pub async fn unlock(&self) -> Result<bool, Error> {
        let was_locked = self.check_locked().await?.is_locked();
        self.store.reset(&self.principal).await?;
        if was_locked {
            tracing::info!(principal = %self.principal, "Lock cleared");
        }
        Ok(was_locked)
    }
}
