//! In-memory repositories for single-instance deployments and tests.
//!
//! Attempt records live in a [`DashMap`]. Each mutation runs while holding the
//! entry's shard guard, which makes increments and lock-sets linearizable per
//! principal without any caller-side locking.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::{
    Account, AttemptRecord, AttemptState, Clock, Error, Principal, SystemClock,
    account::normalize_identifier,
    repositories::{AccountRepository, AttemptStore},
};

pub struct InMemoryAttemptStore {
    records: DashMap<Principal, AttemptRecord>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryAttemptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAttemptStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Use `clock` for the `updated_at` stamps written by `set_lock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Copy of the stored record, if any.
    pub fn record(&self, principal: &Principal) -> Option<AttemptRecord> {
        self.records.get(principal).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AttemptStore for InMemoryAttemptStore {
    async fn increment_failure(
        &self,
        principal: &Principal,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AttemptState, Error> {
        let mut record = self
            .records
            .entry(principal.clone())
            .or_insert_with(|| AttemptRecord::new(principal.clone(), now));

        if let Some(until) = record.locked_until {
            if until > now {
                return Ok(record.state());
            }
            record.locked_until = None;
            record.failure_count = 0;
        }

        record.failure_count = record.failure_count.saturating_add(1);
        if let Some(context) = context {
            record.last_seen_context = Some(context.to_string());
        }
        record.updated_at = now;

        Ok(record.state())
    }

    async fn set_lock(&self, principal: &Principal, until: DateTime<Utc>) -> Result<(), Error> {
        let now = self.clock.now();
        let mut record = self
            .records
            .entry(principal.clone())
            .or_insert_with(|| AttemptRecord::new(principal.clone(), now));

        record.failure_count = 0;
        record.locked_until = Some(until);
        record.updated_at = now;

        Ok(())
    }

    async fn get_state(&self, principal: &Principal) -> Result<AttemptState, Error> {
        Ok(self
            .records
            .get(principal)
            .map(|r| r.state())
            .unwrap_or_default())
    }

    async fn reset(&self, principal: &Principal) -> Result<(), Error> {
        // A missing record and a zeroed record are indistinguishable to readers.
        self.records.remove(principal);
        Ok(())
    }

    async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let mut removed = 0u64;
        self.records.retain(|_, record| {
            let stale = record.state().is_stale(now);
            if stale {
                removed += 1;
            }
            !stale
        });
        Ok(removed)
    }
}

/// Account lookup over a fixed set of accounts, keyed by normalized email.
#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: DashMap<String, Account>,
}

impl InMemoryAccountRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn insert(&self, account: Account) {
        self.accounts
            .insert(normalize_identifier(&account.email), account);
    }

    pub fn set_active(&self, identifier: &str, is_active: bool) {
        if let Some(mut account) = self.accounts.get_mut(&normalize_identifier(identifier)) {
            account.is_active = is_active;
        }
    }
}

#[async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, Error> {
        Ok(self
            .accounts
            .get(&normalize_identifier(identifier))
            .map(|a| a.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AccountId, ManualClock, Role};
    use chrono::Duration;

    #[tokio::test]
    async fn test_increment_creates_record_lazily() {
        let store = InMemoryAttemptStore::new();
        let principal = Principal::origin("1.2.3.4");
        assert!(store.is_empty());

        let state = store
            .increment_failure(&principal, Some("curl/8.0"), Utc::now())
            .await
            .unwrap();
        assert_eq!(state.failure_count, 1);

        let record = store.record(&principal).unwrap();
        assert_eq!(record.failure_count, 1);
        assert_eq!(record.last_seen_context.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_increment_keeps_context_when_absent() {
        let store = InMemoryAttemptStore::new();
        let principal = Principal::origin("1.2.3.4");

        store
            .increment_failure(&principal, Some("Mozilla/5.0"), Utc::now())
            .await
            .unwrap();
        store.increment_failure(&principal, None, Utc::now()).await.unwrap();

        let record = store.record(&principal).unwrap();
        assert_eq!(record.failure_count, 2);
        assert_eq!(record.last_seen_context.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_set_lock_resets_count() {
        let store = InMemoryAttemptStore::new();
        let principal = Principal::account("a@x.com");
        let until = Utc::now() + Duration::seconds(10);

        for _ in 0..3 {
            store.increment_failure(&principal, None, Utc::now()).await.unwrap();
        }
        store.set_lock(&principal, until).await.unwrap();

        let state = store.get_state(&principal).await.unwrap();
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.locked_until, Some(until));
    }

    #[tokio::test]
    async fn test_reset_clears_state() {
        let store = InMemoryAttemptStore::new();
        let principal = Principal::account("a@x.com");

        store.increment_failure(&principal, None, Utc::now()).await.unwrap();
        store
            .set_lock(&principal, Utc::now() + Duration::seconds(10))
            .await
            .unwrap();
        store.reset(&principal).await.unwrap();

        assert_eq!(
            store.get_state(&principal).await.unwrap(),
            AttemptState::default()
        );
    }

    #[tokio::test]
    async fn test_increment_while_locked_counts_nothing() {
        let now = Utc::now();
        let store = InMemoryAttemptStore::new();
        let principal = Principal::account("a@x.com");
        let until = now + Duration::seconds(10);

        store.set_lock(&principal, until).await.unwrap();
        let state = store
            .increment_failure(&principal, Some("curl/8.0"), now + Duration::seconds(9))
            .await
            .unwrap();

        assert_eq!(state.failure_count, 0);
        assert_eq!(state.locked_until, Some(until));
        assert_eq!(store.record(&principal).unwrap().last_seen_context, None);
    }

    #[tokio::test]
    async fn test_increment_after_expiry_restarts_at_one() {
        let now = Utc::now();
        let store = InMemoryAttemptStore::new();
        let principal = Principal::account("a@x.com");
        let until = now + Duration::seconds(10);

        store.set_lock(&principal, until).await.unwrap();
        let state = store.increment_failure(&principal, None, until).await.unwrap();

        assert_eq!(
            state,
            AttemptState {
                failure_count: 1,
                locked_until: None,
            }
        );
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let store = InMemoryAttemptStore::new();
        let account = Principal::account("shared");
        let origin = Principal::origin("shared");

        store.increment_failure(&account, None, Utc::now()).await.unwrap();
        store.increment_failure(&account, None, Utc::now()).await.unwrap();
        store.increment_failure(&origin, None, Utc::now()).await.unwrap();

        assert_eq!(store.get_state(&account).await.unwrap().failure_count, 2);
        assert_eq!(store.get_state(&origin).await.unwrap().failure_count, 1);
    }

    #[tokio::test]
    async fn test_purge_stale_keeps_active_records() {
        let start = Utc::now();
        let clock = Arc::new(ManualClock::new(start));
        let store = InMemoryAttemptStore::with_clock(clock.clone());

        let counting = Principal::account("counting@x.com");
        let locked = Principal::account("locked@x.com");
        let expired = Principal::account("expired@x.com");

        store.increment_failure(&counting, None, start).await.unwrap();
        store
            .set_lock(&locked, start + Duration::minutes(5))
            .await
            .unwrap();
        store
            .set_lock(&expired, start + Duration::seconds(1))
            .await
            .unwrap();

        clock.advance(Duration::seconds(2));
        let removed = store.purge_stale(clock.now()).await.unwrap();

        assert_eq!(removed, 1);
        assert!(store.record(&expired).is_none());
        assert!(store.record(&locked).is_some());
        assert!(store.record(&counting).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        let store = Arc::new(InMemoryAttemptStore::new());
        let principal = Principal::origin("10.0.0.1");

        let handles: Vec<_> = (0..200)
            .map(|_| {
                let store = store.clone();
                let principal = principal.clone();
                tokio::spawn(async move {
                    store.increment_failure(&principal, None, Utc::now()).await
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get_state(&principal).await.unwrap().failure_count, 200);
    }

    #[tokio::test]
    async fn test_account_lookup_is_case_insensitive() {
        let repo = InMemoryAccountRepository::new();
        repo.insert(Account {
            id: AccountId::new("acc_1"),
            email: "Alice@Example.com".to_string(),
            name: Some("Alice".to_string()),
            password_hash: "hash".to_string(),
            role: Role::User,
            is_active: true,
        });

        let found = repo.find_by_identifier("alice@example.com").await.unwrap();
        assert_eq!(found.unwrap().id, AccountId::new("acc_1"));

        repo.set_active("ALICE@example.com", false);
        let found = repo.find_by_identifier("alice@example.com").await.unwrap();
        assert!(!found.unwrap().is_active);

        assert!(repo.find_by_identifier("bob@example.com").await.unwrap().is_none());
    }
}
