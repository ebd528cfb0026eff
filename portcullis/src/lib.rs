//! # Portcullis
//!
//! Portcullis protects password sign-in against brute force attacks. Every
//! attempt is checked against two independent failure counters, one per
//! account and one per network origin, each with its own threshold and timed
//! lock. A locked account or origin is turned away before the password is
//! ever compared.
//!
//! ## Storage Support
//!
//! - In-memory (single instance)
//! - SQLite
//!
//! Any store offering an atomic counter increment can be plugged in by
//! implementing [`AttemptStore`](repositories::AttemptStore).
//!
//! ## Example
//!
//! ```rust,no_run
//! use portcullis::{PortcullisBuilder, RequestContext, AuthOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let portcullis = PortcullisBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     let ctx = RequestContext::from_forwarded_for(Some("203.0.113.7"), Some("Mozilla/5.0"));
//!     match portcullis.login("user@example.com", "hunter2", &ctx).await? {
//!         AuthOutcome::Success { account_id, .. } => println!("welcome {account_id}"),
//!         outcome => println!("{}", portcullis.message(&outcome)),
//!     }
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use portcullis_core::{
    AuthenticationGate, LockoutStatus,
    repositories::{AccountRepository, AttemptStore},
};

pub mod builder;

pub use builder::{NoStorage, PortcullisBuilder, PortcullisBuilderError, WithStorage};

/// Re-export core types from portcullis_core
pub use portcullis_core::{
    Account, AccountId, Argon2PasswordVerifier, AuthOutcome, Clock, LockStatus, LockoutConfig,
    ManualClock, PasswordVerifier, Principal, RequestContext, Role, Scope, ScopeConfig,
    SystemClock, crypto::hash_password, repositories,
};

/// Re-export storage backends
#[cfg(feature = "sqlite")]
pub mod sqlite {
    pub use portcullis_storage_sqlite::*;
}

/// Errors that can occur when using Portcullis.
///
/// Declined sign-ins are not errors; they are [`AuthOutcome`] values.
#[derive(Debug, thiserror::Error)]
pub enum PortcullisError {
    /// Attempt or account storage failed. The sign-in must be declined.
    #[error("Storage error: {0}")]
    StorageError(String),
    /// The request was malformed (e.g. an empty password)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Password verification failed to run
    #[error("Auth error: {0}")]
    AuthError(String),
}

impl PortcullisError {
    /// Whether attempt or account storage could not be reached.
    pub fn is_storage_error(&self) -> bool {
        matches!(self, PortcullisError::StorageError(_))
    }
}

impl From<portcullis_core::Error> for PortcullisError {
    fn from(e: portcullis_core::Error) -> Self {
        match e {
            portcullis_core::Error::Storage(e) => PortcullisError::StorageError(e.to_string()),
            portcullis_core::Error::Validation(e) => PortcullisError::InvalidRequest(e.to_string()),
            portcullis_core::Error::Auth(e) => PortcullisError::AuthError(e.to_string()),
        }
    }
}

/// The login gate, ready to be shared across request handlers.
///
/// Cloning is cheap; all clones share the same gate.
pub struct Portcullis<A: AccountRepository, S: AttemptStore> {
    gate: Arc<AuthenticationGate<A, S>>,
}

impl<A: AccountRepository, S: AttemptStore> Clone for Portcullis<A, S> {
    fn clone(&self) -> Self {
        Self {
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<A: AccountRepository, S: AttemptStore> Portcullis<A, S> {
    pub fn new(gate: AuthenticationGate<A, S>) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    pub fn gate(&self) -> &AuthenticationGate<A, S> {
        &self.gate
    }

    pub fn config(&self) -> &LockoutConfig {
        self.gate.config()
    }

    /// Run a password sign-in through the lockout checks.
    ///
    /// # Arguments
    ///
    /// * `identifier`: The account's email
    /// * `password`: The plaintext password, never logged
    /// * `ctx`: The request's origin and user agent
    pub async fn login(
        &self,
        identifier: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<AuthOutcome, PortcullisError> {
        Ok(self.gate.authenticate(identifier, password, ctx).await?)
    }

    /// The user-facing message for an outcome, using the gate's clock.
    pub fn message(&self, outcome: &AuthOutcome) -> String {
        outcome.message(self.gate.clock().now())
    }

    /// Current counter and lock for an account or origin.
    pub async fn lockout_status(
        &self,
        scope: Scope,
        key: &str,
    ) -> Result<LockoutStatus, PortcullisError> {
        let tracker = match scope {
            Scope::Account => self.gate.account_tracker(key),
            Scope::Origin => self.gate.origin_tracker(key),
        };
        Ok(tracker.status().await?)
    }

    /// Clear an account's lock, e.g. after a password reset.
    ///
    /// Returns `true` if the account was locked.
    pub async fn unlock_account(&self, identifier: &str) -> Result<bool, PortcullisError> {
        Ok(self.gate.unlock_account(identifier).await?)
    }

    /// Clear an origin's lock.
    pub async fn unlock_origin(&self, origin: &str) -> Result<bool, PortcullisError> {
        Ok(self.gate.unlock_origin(origin).await?)
    }

    /// Start the periodic purge of stale attempt records.
    ///
    /// Send `true` on the paired `watch::Sender` to stop it.
    pub fn start_cleanup_task(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        self.gate.start_cleanup_task(shutdown)
    }
}
