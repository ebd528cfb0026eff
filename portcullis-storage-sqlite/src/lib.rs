//! SQLite storage backend for portcullis
//!
//! Provides [`SqliteAttemptStore`] and [`SqliteAccountRepository`] over a
//! shared [`SqlitePool`].
//!
//! ```rust,no_run
//! use portcullis_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), portcullis_core::Error> {
//! let storage = SqliteStorage::connect("sqlite::memory:").await?;
//! storage.migrate().await?;
//! let store = storage.attempt_store();
//! # Ok(())
//! # }
//! ```
pub mod migrations;
pub mod repositories;

use std::sync::Arc;

use crate::migrations::{MIGRATIONS, SqliteMigrationManager};
use portcullis_core::{Clock, Error, error::StorageError};

pub use repositories::{SqliteAccountRepository, SqliteAttemptStore};
pub use sqlx::SqlitePool;

#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the database at `url` (e.g. `sqlite::memory:` or `sqlite://auth.db`).
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let pool = SqlitePool::connect(url).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            StorageError::Unavailable(e.to_string())
        })?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), Error> {
        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await?;
        manager.up(MIGRATIONS).await
    }

    pub async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(())
    }

    pub fn attempt_store(&self) -> SqliteAttemptStore {
        SqliteAttemptStore::new(self.pool.clone())
    }

    /// An attempt store stamping records with `clock`.
    pub fn attempt_store_with_clock(&self, clock: Arc<dyn Clock>) -> SqliteAttemptStore {
        SqliteAttemptStore::with_clock(self.pool.clone(), clock)
    }

    pub fn account_repository(&self) -> SqliteAccountRepository {
        SqliteAccountRepository::new(self.pool.clone())
    }
}
