//! Versioned schema migrations.
//!
//! Applied versions are recorded in `_portcullis_migrations`; each migration
//! runs in its own transaction together with its bookkeeping row.

use chrono::Utc;
use portcullis_core::{Error, error::StorageError};
use sqlx::SqlitePool;

pub struct SqliteMigration {
    pub version: i64,
    pub name: &'static str,
    pub statements: &'static [&'static str],
}

pub const MIGRATIONS: &[SqliteMigration] = &[
    SqliteMigration {
        version: 1,
        name: "create_login_attempts",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS login_attempts (
                scope TEXT NOT NULL,
                principal_key TEXT NOT NULL,
                failure_count INTEGER NOT NULL DEFAULT 0,
                locked_until INTEGER,
                last_seen_context TEXT,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (scope, principal_key)
            )"#],
    },
    SqliteMigration {
        version: 2,
        name: "create_accounts",
        statements: &[r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            )"#],
    },
    SqliteMigration {
        version: 3,
        name: "index_stale_login_attempts",
        statements: &[
            "CREATE INDEX IF NOT EXISTS idx_login_attempts_stale ON login_attempts (failure_count, locked_until)",
        ],
    },
];

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn migration_table_name(&self) -> &str {
        "_portcullis_migrations"
    }

    /// Create the bookkeeping table.
    pub async fn initialize(&self) -> Result<(), Error> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL
            )"#,
            self.migration_table_name()
        ))
        .execute(&self.pool)
        .await
        .map_err(migration_err)?;

        Ok(())
    }

    /// Apply every migration not yet recorded, in order.
    pub async fn up(&self, migrations: &[SqliteMigration]) -> Result<(), Error> {
        for migration in migrations {
            if self.is_applied(migration.version).await? {
                continue;
            }

            let mut tx = self.pool.begin().await.map_err(migration_err)?;

            tracing::info!(
                "Applying migration {} ({})",
                migration.name,
                migration.version
            );

            for statement in migration.statements {
                sqlx::query(statement)
                    .execute(&mut *tx)
                    .await
                    .map_err(migration_err)?;
            }

            sqlx::query(&format!(
                "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                self.migration_table_name()
            ))
            .bind(migration.version)
            .bind(migration.name)
            .bind(Utc::now().timestamp())
            .execute(&mut *tx)
            .await
            .map_err(migration_err)?;

            tx.commit().await.map_err(migration_err)?;
        }
        Ok(())
    }

    pub async fn is_applied(&self, version: i64) -> Result<bool, Error> {
        let row: Option<(i64,)> = sqlx::query_as(&format!(
            "SELECT version FROM {} WHERE version = ?",
            self.migration_table_name()
        ))
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(migration_err)?;

        Ok(row.is_some())
    }

    pub async fn applied_versions(&self) -> Result<Vec<i64>, Error> {
        let rows: Vec<(i64,)> = sqlx::query_as(&format!(
            "SELECT version FROM {} ORDER BY version",
            self.migration_table_name()
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(migration_err)?;

        Ok(rows.into_iter().map(|(version,)| version).collect())
    }
}

fn migration_err(e: sqlx::Error) -> Error {
    tracing::error!(error = %e, "Migration failed");
    Error::Storage(StorageError::Migration(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_apply_once() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        let manager = SqliteMigrationManager::new(pool);

        manager.initialize().await.unwrap();
        manager.up(MIGRATIONS).await.unwrap();
        manager.up(MIGRATIONS).await.unwrap();

        assert_eq!(manager.applied_versions().await.unwrap(), vec![1, 2, 3]);
    }
}
