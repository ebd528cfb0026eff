//! SQLite implementation of the account repository.

use async_trait::async_trait;
use chrono::Utc;
use portcullis_core::{
    Account, AccountId, Error,
    account::normalize_identifier,
    error::{DatabaseResultExt, StorageError},
    repositories::AccountRepository,
};
use sqlx::SqlitePool;

pub struct SqliteAccountRepository {
    pool: SqlitePool,
}

impl SqliteAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an account. The email is stored normalized.
    pub async fn create(&self, account: &Account) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, name, password_hash, role, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.as_str())
        .bind(normalize_identifier(&account.email))
        .bind(&account.name)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(account.is_active)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_db_err_with_context("Failed to create account")?;

        Ok(())
    }

    pub async fn set_active(&self, id: &AccountId, is_active: bool) -> Result<(), Error> {
        let result = sqlx::query("UPDATE accounts SET is_active = ? WHERE id = ?")
            .bind(is_active)
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to update account")?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound.into());
        }
        Ok(())
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteAccount {
    id: String,
    email: String,
    name: Option<String>,
    password_hash: String,
    role: String,
    is_active: bool,
}

impl TryFrom<SqliteAccount> for Account {
    type Error = Error;

    fn try_from(row: SqliteAccount) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId::from(row.id),
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            role: row.role.parse()?,
            is_active: row.is_active,
        })
    }
}

#[async_trait]
impl AccountRepository for SqliteAccountRepository {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, Error> {
        let row = sqlx::query_as::<_, SqliteAccount>(
            r#"
            SELECT id, email, name, password_hash, role, is_active
            FROM accounts
            WHERE email = ?
            "#,
        )
        .bind(normalize_identifier(identifier))
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to find account")?;

        row.map(Account::try_from).transpose()
    }
}
