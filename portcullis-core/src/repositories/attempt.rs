//! Repository trait for failed attempt counters.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AttemptState, Error, Principal};

/// Durable per-principal failure counters with timed locks.
///
/// Every operation must be atomic with respect to concurrent callers on the
/// same principal. In particular `increment_failure` must not be built as a
/// read followed by a write: two failures arriving together must both count.
///
/// # Errors
///
/// Implementations report infrastructure faults as
/// [`StorageError::Unavailable`](crate::error::StorageError::Unavailable) or
/// [`StorageError::Database`](crate::error::StorageError::Database). Callers
/// never interpret either as "not locked".
#[async_trait]
pub trait AttemptStore: Send + Sync + 'static {
    /// Add one failure and return the resulting state.
    ///
    /// While a lock is active at `now` nothing is counted and the locked
    /// state is returned unchanged. A lock that ended at or before `now` is
    /// cleared and counting restarts at one. Creates the record on first
    /// use. `context` replaces the record's last seen context when present.
    async fn increment_failure(
        &self,
        principal: &Principal,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AttemptState, Error>;

    /// Lock the principal until `until` and reset its count to zero.
    async fn set_lock(&self, principal: &Principal, until: DateTime<Utc>) -> Result<(), Error>;

    /// Snapshot of the principal's counter. Unknown principals read as the default state.
    async fn get_state(&self, principal: &Principal) -> Result<AttemptState, Error>;

    /// Clear the count and any lock.
    async fn reset(&self, principal: &Principal) -> Result<(), Error>;

    /// Remove records with no failures and no lock active at `now`.
    ///
    /// Returns the number of records removed. Purging has no effect on any
    /// lock decision.
    async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64, Error>;
}
