//! SQLite implementation of the attempt store.
//!
//! Every mutation is a single statement, so SQLite's statement atomicity is
//! what keeps concurrent increments from being lost. Timestamps are stored as
//! unix milliseconds.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use portcullis_core::{
    AttemptRecord, AttemptState, Clock, Error, Principal, SystemClock,
    error::DatabaseResultExt,
    repositories::AttemptStore,
};
use sqlx::SqlitePool;

pub struct SqliteAttemptStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteAttemptStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Use `clock` for the `updated_at` stamps written by `set_lock`.
    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// The full stored record, if any.
    pub async fn record(&self, principal: &Principal) -> Result<Option<AttemptRecord>, Error> {
        let row = sqlx::query_as::<_, SqliteAttemptRecord>(
            r#"
            SELECT failure_count, locked_until, last_seen_context, updated_at
            FROM login_attempts
            WHERE scope = ? AND principal_key = ?
            "#,
        )
        .bind(principal.scope().as_str())
        .bind(principal.key())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to get attempt record")?;

        Ok(row.map(|row| AttemptRecord {
            principal: principal.clone(),
            failure_count: to_count(row.failure_count),
            locked_until: row.locked_until.and_then(DateTime::from_timestamp_millis),
            last_seen_context: row.last_seen_context,
            updated_at: DateTime::from_timestamp_millis(row.updated_at).unwrap_or_default(),
        }))
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptState {
    failure_count: i64,
    locked_until: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteAttemptRecord {
    failure_count: i64,
    locked_until: Option<i64>,
    last_seen_context: Option<String>,
    updated_at: i64,
}

fn to_count(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

#[async_trait]
impl AttemptStore for SqliteAttemptStore {
    async fn increment_failure(
        &self,
        principal: &Principal,
        context: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AttemptState, Error> {
        // SET expressions all read the pre-update row. `excluded.updated_at`
        // is `now`; a NULL `locked_until` fails every comparison.
        let row = sqlx::query_as::<_, SqliteAttemptState>(
            r#"
            INSERT INTO login_attempts (scope, principal_key, failure_count, last_seen_context, updated_at)
            VALUES (?, ?, 1, ?, ?)
            ON CONFLICT (scope, principal_key) DO UPDATE SET
                failure_count = CASE
                    WHEN login_attempts.locked_until > excluded.updated_at
                        THEN login_attempts.failure_count
                    WHEN login_attempts.locked_until IS NOT NULL THEN 1
                    ELSE login_attempts.failure_count + 1
                END,
                locked_until = CASE
                    WHEN login_attempts.locked_until > excluded.updated_at
                        THEN login_attempts.locked_until
                    ELSE NULL
                END,
                last_seen_context = CASE
                    WHEN login_attempts.locked_until > excluded.updated_at
                        THEN login_attempts.last_seen_context
                    ELSE COALESCE(excluded.last_seen_context, login_attempts.last_seen_context)
                END,
                updated_at = CASE
                    WHEN login_attempts.locked_until > excluded.updated_at
                        THEN login_attempts.updated_at
                    ELSE excluded.updated_at
                END
            RETURNING failure_count, locked_until
            "#,
        )
        .bind(principal.scope().as_str())
        .bind(principal.key())
        .bind(context)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to record failed login attempt")?;

        Ok(AttemptState {
            failure_count: to_count(row.failure_count),
            locked_until: row.locked_until.and_then(DateTime::from_timestamp_millis),
        })
    }

    async fn set_lock(&self, principal: &Principal, until: DateTime<Utc>) -> Result<(), Error> {
        let now = self.clock.now().timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO login_attempts (scope, principal_key, failure_count, locked_until, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT (scope, principal_key) DO UPDATE SET
                failure_count = 0,
                locked_until = excluded.locked_until,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(principal.scope().as_str())
        .bind(principal.key())
        .bind(until.timestamp_millis())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to set lock")?;

        Ok(())
    }

    async fn get_state(&self, principal: &Principal) -> Result<AttemptState, Error> {
        let row = sqlx::query_as::<_, SqliteAttemptState>(
            r#"
            SELECT failure_count, locked_until
            FROM login_attempts
            WHERE scope = ? AND principal_key = ?
            "#,
        )
        .bind(principal.scope().as_str())
        .bind(principal.key())
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to get attempt state")?;

        Ok(row
            .map(|row| AttemptState {
                failure_count: to_count(row.failure_count),
                locked_until: row.locked_until.and_then(DateTime::from_timestamp_millis),
            })
            .unwrap_or_default())
    }

    async fn reset(&self, principal: &Principal) -> Result<(), Error> {
        sqlx::query("DELETE FROM login_attempts WHERE scope = ? AND principal_key = ?")
            .bind(principal.scope().as_str())
            .bind(principal.key())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to reset attempts")?;

        Ok(())
    }

    async fn purge_stale(&self, now: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM login_attempts
            WHERE failure_count = 0
            AND (locked_until IS NULL OR locked_until <= ?)
            "#,
        )
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to purge stale attempts")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::{MIGRATIONS, SqliteMigrationManager};
    use chrono::Duration;
    use portcullis_core::ManualClock;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        let manager = SqliteMigrationManager::new(pool.clone());
        manager
            .initialize()
            .await
            .expect("Failed to initialize migrations");
        manager
            .up(MIGRATIONS)
            .await
            .expect("Failed to run migrations");

        pool
    }

    #[tokio::test]
    async fn test_increment_failure() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let principal = Principal::origin("192.168.1.1");

        for expected in 1..=3 {
            let count = store
                .increment_failure(&principal, Some("curl/8.0"), Utc::now())
                .await
                .expect("Failed to increment");
            assert_eq!(count.failure_count, expected);
        }

        let record = store.record(&principal).await.unwrap().unwrap();
        assert_eq!(record.failure_count, 3);
        assert_eq!(record.last_seen_context.as_deref(), Some("curl/8.0"));
    }

    #[tokio::test]
    async fn test_increment_keeps_context_when_absent() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let principal = Principal::origin("192.168.1.1");

        store
            .increment_failure(&principal, Some("Mozilla/5.0"), Utc::now())
            .await
            .unwrap();
        store.increment_failure(&principal, None, Utc::now()).await.unwrap();

        let record = store.record(&principal).await.unwrap().unwrap();
        assert_eq!(record.last_seen_context.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_get_state_unknown_principal() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);

        let state = store
            .get_state(&Principal::account("nobody@example.com"))
            .await
            .unwrap();
        assert_eq!(state, AttemptState::default());
    }

    #[tokio::test]
    async fn test_set_lock_resets_count() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let principal = Principal::account("test@example.com");
        let until = DateTime::from_timestamp_millis(
            (Utc::now() + Duration::seconds(10)).timestamp_millis(),
        )
        .unwrap();

        for _ in 0..4 {
            store.increment_failure(&principal, None, Utc::now()).await.unwrap();
        }
        store.set_lock(&principal, until).await.unwrap();

        let state = store.get_state(&principal).await.unwrap();
        assert_eq!(state.failure_count, 0);
        assert_eq!(state.locked_until, Some(until));
    }

    #[tokio::test]
    async fn test_increment_while_locked_counts_nothing() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let principal = Principal::account("test@example.com");
        let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        let until = now + Duration::seconds(10);

        store
            .increment_failure(&principal, Some("Mozilla/5.0"), now)
            .await
            .unwrap();
        store.set_lock(&principal, until).await.unwrap();

        for _ in 0..3 {
            let state = store
                .increment_failure(&principal, Some("curl/8.0"), now + Duration::seconds(5))
                .await
                .unwrap();
            assert_eq!(state.failure_count, 0);
            assert_eq!(state.locked_until, Some(until));
        }

        let record = store.record(&principal).await.unwrap().unwrap();
        assert_eq!(record.failure_count, 0);
        assert_eq!(record.last_seen_context.as_deref(), Some("Mozilla/5.0"));
    }

    #[tokio::test]
    async fn test_increment_after_expiry_restarts_at_one() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let principal = Principal::account("test@example.com");
        let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        let until = now + Duration::seconds(10);

        store.set_lock(&principal, until).await.unwrap();
        let state = store
            .increment_failure(&principal, None, until)
            .await
            .unwrap();

        assert_eq!(
            state,
            AttemptState {
                failure_count: 1,
                locked_until: None,
            }
        );
    }

    #[tokio::test]
    async fn test_set_lock_stamps_injected_clock() {
        let pool = setup_test_db().await;
        let start = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = SqliteAttemptStore::with_clock(pool, clock);
        let principal = Principal::origin("192.168.1.1");

        store
            .set_lock(&principal, start + Duration::minutes(15))
            .await
            .unwrap();

        let record = store.record(&principal).await.unwrap().unwrap();
        assert_eq!(record.updated_at, start);
    }

    #[tokio::test]
    async fn test_reset_clears_record() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let principal = Principal::account("test@example.com");

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
        assert!(store.record(&principal).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);

        store
            .increment_failure(&Principal::account("shared"), None, Utc::now())
            .await
            .unwrap();
        let state = store
            .increment_failure(&Principal::origin("shared"), None, Utc::now())
            .await
            .unwrap();

        assert_eq!(state.failure_count, 1);
    }

    #[tokio::test]
    async fn test_purge_stale_respects_active_locks() {
        let pool = setup_test_db().await;
        let store = SqliteAttemptStore::new(pool);
        let now = Utc::now();

        store
            .increment_failure(&Principal::account("counting@example.com"), None, Utc::now())
            .await
            .unwrap();
        store
            .set_lock(&Principal::account("locked@example.com"), now + Duration::hours(1))
            .await
            .unwrap();
        store
            .set_lock(&Principal::account("expired@example.com"), now - Duration::seconds(1))
            .await
            .unwrap();

        let deleted = store.purge_stale(now).await.unwrap();
        assert_eq!(deleted, 1);

        let state = store
            .get_state(&Principal::account("locked@example.com"))
            .await
            .unwrap();
        assert!(state.active_lock(now).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_not_lost() {
        // One connection keeps in-memory SQLite from reporting table locks;
        // tasks still interleave between statements.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let manager = SqliteMigrationManager::new(pool.clone());
        manager.initialize().await.unwrap();
        manager.up(MIGRATIONS).await.unwrap();

        let store = Arc::new(SqliteAttemptStore::new(pool));
        let principal = Principal::origin("10.0.0.1");

        let handles: Vec<_> = (0..50)
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

        assert_eq!(store.get_state(&principal).await.unwrap().failure_count, 50);
    }
}
