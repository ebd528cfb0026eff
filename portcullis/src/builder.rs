//! Builder pattern for constructing Portcullis instances
//!
//! The builder uses a type-state pattern so storage must be configured before
//! [`build`](PortcullisBuilder::build) is available.
//!
//! # Example
//!
//! ```rust,no_run
//! use portcullis::PortcullisBuilder;
//! use chrono::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_lock_duration(Duration::seconds(30))
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use chrono::Duration;
use portcullis_core::{
    Argon2PasswordVerifier, AuthenticationGate, Clock, LockoutConfig, PasswordVerifier,
    SystemClock,
    repositories::{AccountRepository, AttemptStore, InMemoryAttemptStore},
};

use crate::Portcullis;

/// Errors that can occur when building a Portcullis instance.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Marker type indicating no storage has been configured yet.
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<A: AccountRepository, S: AttemptStore> {
    accounts: Arc<A>,
    store: Arc<S>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<crate::sqlite::SqliteStorage>,
}

/// A type-safe builder for [`Portcullis`].
///
/// # Defaults
///
/// - Lockout: account 10 / origin 20 failures, 15 minute lock
/// - Clock: [`SystemClock`]
/// - Password verifier: [`Argon2PasswordVerifier`]
/// - Apply migrations: false
pub struct PortcullisBuilder<Storage> {
    storage: Storage,
    config: LockoutConfig,
    clock: Arc<dyn Clock>,
    verifier: Arc<dyn PasswordVerifier>,
    #[cfg(feature = "sqlite")]
    apply_migrations: bool,
}

impl Default for PortcullisBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl PortcullisBuilder<NoStorage> {
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: LockoutConfig::default(),
            clock: Arc::new(SystemClock),
            verifier: Arc::new(Argon2PasswordVerifier),
            #[cfg(feature = "sqlite")]
            apply_migrations: false,
        }
    }

    /// Use the given account repository and attempt store.
    pub fn with_repositories<A: AccountRepository, S: AttemptStore>(
        self,
        accounts: Arc<A>,
        store: Arc<S>,
    ) -> PortcullisBuilder<WithStorage<A, S>> {
        PortcullisBuilder {
            storage: WithStorage {
                accounts,
                store,
                #[cfg(feature = "sqlite")]
                sqlite: None,
            },
            config: self.config,
            clock: self.clock,
            verifier: self.verifier,
            #[cfg(feature = "sqlite")]
            apply_migrations: self.apply_migrations,
        }
    }

    /// Keep attempt counters in process memory.
    ///
    /// Suitable for a single instance; counters are lost on restart.
    pub fn with_in_memory_store<A: AccountRepository>(
        self,
        accounts: Arc<A>,
    ) -> PortcullisBuilder<WithStorage<A, InMemoryAttemptStore>> {
        let store = Arc::new(InMemoryAttemptStore::with_clock(self.clock.clone()));
        self.with_repositories(accounts, store)
    }
}

#[cfg(feature = "sqlite")]
impl PortcullisBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        PortcullisBuilder<
            WithStorage<crate::sqlite::SqliteAccountRepository, crate::sqlite::SqliteAttemptStore>,
        >,
        PortcullisBuilderError,
    > {
        let storage = crate::sqlite::SqliteStorage::connect(url)
            .await
            .map_err(|e| PortcullisBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_sqlite_storage(storage))
    }

    /// Configure SQLite storage with an existing pool.
    pub fn with_sqlite_pool(
        self,
        pool: crate::sqlite::SqlitePool,
    ) -> PortcullisBuilder<
        WithStorage<crate::sqlite::SqliteAccountRepository, crate::sqlite::SqliteAttemptStore>,
    > {
        self.with_sqlite_storage(crate::sqlite::SqliteStorage::new(pool))
    }

    fn with_sqlite_storage(
        self,
        storage: crate::sqlite::SqliteStorage,
    ) -> PortcullisBuilder<
        WithStorage<crate::sqlite::SqliteAccountRepository, crate::sqlite::SqliteAttemptStore>,
    > {
        PortcullisBuilder {
            storage: WithStorage {
                accounts: Arc::new(storage.account_repository()),
                store: Arc::new(storage.attempt_store_with_clock(self.clock.clone())),
                sqlite: Some(storage),
            },
            config: self.config,
            clock: self.clock,
            verifier: self.verifier,
            apply_migrations: self.apply_migrations,
        }
    }
}

impl<Storage> PortcullisBuilder<Storage> {
    /// Replace the whole lockout configuration.
    pub fn with_config(mut self, config: LockoutConfig) -> Self {
        self.config = config;
        self
    }

    /// Use the same lock window for accounts and origins.
    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.config = self.config.with_lock_duration(duration);
        self
    }

    pub fn with_account_threshold(mut self, max_failures: u32) -> Self {
        self.config = self.config.with_account_threshold(max_failures);
        self
    }

    pub fn with_origin_threshold(mut self, max_failures: u32) -> Self {
        self.config = self.config.with_origin_threshold(max_failures);
        self
    }

    /// Count unknown-account lookups against the origin.
    pub fn count_unknown_accounts(mut self, count: bool) -> Self {
        self.config = self.config.with_count_unknown_accounts(count);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_password_verifier(mut self, verifier: Arc<dyn PasswordVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Run SQLite migrations during [`build`](PortcullisBuilder::build).
    ///
    /// Has no effect on other backends.
    #[cfg(feature = "sqlite")]
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }
}

impl<A: AccountRepository, S: AttemptStore> PortcullisBuilder<WithStorage<A, S>> {
    /// Validate the configuration, optionally migrate, and build.
    pub async fn build(self) -> Result<Portcullis<A, S>, PortcullisBuilderError> {
        #[cfg(feature = "sqlite")]
        if self.apply_migrations {
            if let Some(storage) = &self.storage.sqlite {
                storage
                    .migrate()
                    .await
                    .map_err(|e| PortcullisBuilderError::Migration(e.to_string()))?;
            }
        }

        let gate = AuthenticationGate::new(
            self.storage.accounts,
            self.storage.store,
            self.verifier,
            self.clock,
            self.config,
        )
        .map_err(|e| PortcullisBuilderError::InvalidConfiguration(e.to_string()))?;

        tracing::debug!(
            account_threshold = gate.config().account.max_failures,
            origin_threshold = gate.config().origin.max_failures,
            enabled = gate.is_enabled(),
            "Login gate ready"
        );

        Ok(Portcullis::new(gate))
    }
}
