#![cfg(feature = "sqlite")]

use std::sync::Arc;

use chrono::{Duration, Utc};
use portcullis::{
    Account, AccountId, AuthOutcome, Clock, ManualClock, Portcullis, PortcullisBuilder,
    RequestContext, Role, Scope, hash_password,
    sqlite::{SqliteAccountRepository, SqliteAttemptStore, SqlitePool, SqliteStorage},
};
use sqlx::sqlite::SqlitePoolOptions;

type SqlitePortcullis = Portcullis<SqliteAccountRepository, SqliteAttemptStore>;

async fn single_connection_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open SQLite")
}

async fn setup(pool: SqlitePool, clock: Arc<ManualClock>) -> SqlitePortcullis {
    let _ = tracing_subscriber::fmt().try_init();

    let portcullis = PortcullisBuilder::new()
        .with_clock(clock)
        .with_lock_duration(Duration::seconds(10))
        .with_sqlite_pool(pool.clone())
        .apply_migrations(true)
        .build()
        .await
        .expect("Failed to build Portcullis");

    SqliteStorage::new(pool)
        .account_repository()
        .create(&Account {
            id: AccountId::new("acc_alice"),
            email: "Alice@Example.com".to_string(),
            name: Some("Alice".to_string()),
            password_hash: hash_password("correct horse"),
            role: Role::Admin,
            is_active: true,
        })
        .await
        .expect("Failed to create account");

    portcullis
}

fn ctx() -> RequestContext {
    RequestContext::from_forwarded_for(Some("203.0.113.7, 10.0.0.1"), Some("curl/8.0"))
}

#[tokio::test]
async fn test_sign_in_with_real_hash() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let portcullis = setup(single_connection_pool().await, clock).await;

    let outcome = portcullis
        .login("alice@example.com", "battery staple", &ctx())
        .await
        .unwrap();
    assert_eq!(outcome, AuthOutcome::InvalidPassword);

    let status = portcullis
        .lockout_status(Scope::Origin, "203.0.113.7")
        .await
        .unwrap();
    assert_eq!(status.failed_attempts, 1);

    let outcome = portcullis
        .login(" ALICE@example.com ", "correct horse", &ctx())
        .await
        .unwrap();
    match outcome {
        AuthOutcome::Success {
            account_id, role, ..
        } => {
            assert_eq!(account_id, AccountId::new("acc_alice"));
            assert_eq!(role, Role::Admin);
        }
        other => panic!("expected success, got {other:?}"),
    }

    let status = portcullis
        .lockout_status(Scope::Account, "alice@example.com")
        .await
        .unwrap();
    assert_eq!(status.failed_attempts, 0);
}

#[tokio::test]
async fn test_lock_persists_and_expires() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let pool = single_connection_pool().await;
    let portcullis = setup(pool.clone(), clock.clone()).await;
    let store = SqliteStorage::new(pool).attempt_store();

    for i in 0..10 {
        let ctx = RequestContext::new(Some(format!("198.51.100.{i}")), None);
        store_failure(&portcullis, &ctx).await;
    }

    let outcome = portcullis
        .login("alice@example.com", "correct horse", &ctx())
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        AuthOutcome::Locked {
            scope: Scope::Account,
            ..
        }
    ));
    assert_eq!(outcome.retry_after_seconds(clock.now()), Some(10));

    // A second handle on the same database sees the lock.
    let record = store
        .record(&portcullis::Principal::account("alice@example.com"))
        .await
        .unwrap()
        .expect("attempt record");
    assert!(record.locked_until.is_some());

    clock.advance(Duration::seconds(11));
    let outcome = portcullis
        .login("alice@example.com", "correct horse", &ctx())
        .await
        .unwrap();
    assert!(outcome.is_success());
}

async fn store_failure(portcullis: &SqlitePortcullis, ctx: &RequestContext) {
    let outcome = portcullis
        .login("alice@example.com", "wrong", ctx)
        .await
        .unwrap();
    assert!(!outcome.is_success());
}

#[tokio::test]
async fn test_deactivated_account_is_rejected() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let pool = single_connection_pool().await;
    let portcullis = setup(pool.clone(), clock).await;

    SqliteStorage::new(pool)
        .account_repository()
        .set_active(&AccountId::new("acc_alice"), false)
        .await
        .unwrap();

    let outcome = portcullis
        .login("alice@example.com", "correct horse", &ctx())
        .await
        .unwrap();
    assert_eq!(outcome, AuthOutcome::AccountDisabled);
    assert_eq!(portcullis.message(&outcome), "Account has been deactivated");
}

#[tokio::test]
async fn test_unreachable_database_fails_closed() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let pool = single_connection_pool().await;
    let portcullis = setup(pool.clone(), clock).await;

    pool.close().await;

    let err = portcullis
        .login("alice@example.com", "correct horse", &ctx())
        .await
        .unwrap_err();
    assert!(err.is_storage_error());
}
