//! Principals and their attempt records
//!
//! A principal is whatever is being rate-limited. There are two independent
//! namespaces, one keyed by account identifier and one keyed by network origin:
//!
//! | Field               | Type               | Description                                          |
//! | ------------------- | ------------------ | ---------------------------------------------------- |
//! | `principal`         | `Principal`        | Scope plus key, unique within its scope.             |
//! | `failure_count`     | `u32`              | Consecutive failures since the last reset or lock.   |
//! | `locked_until`      | `Option<DateTime>` | Lock expiry; a past value is treated as absent.      |
//! | `last_seen_context` | `Option<String>`   | Last user agent seen. Informational only.            |
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The namespace a principal belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Account,
    Origin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Account => "account",
            Scope::Origin => "origin",
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rate-limited entity: an account identifier or a network origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    scope: Scope,
    key: String,
}

impl Principal {
    pub fn new(scope: Scope, key: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
        }
    }

    pub fn account(identifier: impl Into<String>) -> Self {
        Self::new(Scope::Account, identifier)
    }

    pub fn origin(origin: impl Into<String>) -> Self {
        Self::new(Scope::Origin, origin)
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.scope, self.key)
    }
}

/// Read-only snapshot of a principal's counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    pub failure_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl AttemptState {
    /// The lock expiry if it is still ahead of `now`.
    pub fn active_lock(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.locked_until.filter(|until| *until > now)
    }

    /// True when the record carries nothing that could affect a decision at `now`.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.failure_count == 0 && self.active_lock(now).is_none()
    }
}

/// A stored attempt record, as held by a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub principal: Principal,
    pub failure_count: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_seen_context: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(principal: Principal, updated_at: DateTime<Utc>) -> Self {
        Self {
            principal,
            failure_count: 0,
            locked_until: None,
            last_seen_context: None,
            updated_at,
        }
    }

    pub fn state(&self) -> AttemptState {
        AttemptState {
            failure_count: self.failure_count,
            locked_until: self.locked_until,
        }
    }
}

/// Whether a principal is currently locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    LockedUntil(DateTime<Utc>),
}

impl LockStatus {
    pub fn is_locked(&self) -> bool {
        matches!(self, LockStatus::LockedUntil(_))
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        match self {
            LockStatus::Unlocked => None,
            LockStatus::LockedUntil(until) => Some(*until),
        }
    }
}

/// Point-in-time view of a principal's protection state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutStatus {
    pub principal: Principal,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LockoutStatus {
    pub fn is_locked(&self) -> bool {
        self.locked_until.is_some()
    }

    /// Seconds until the lock lifts, rounded up, or `None` when unlocked.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.locked_until.map(|until| remaining_seconds(until, now))
    }
}

/// Whole seconds from `now` to `until`, rounded up and never negative.
pub(crate) fn remaining_seconds(until: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (until - now).num_milliseconds().max(0);
    (millis + 999) / 1000
}
