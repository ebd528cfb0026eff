//! The sign-in entry point.
//!
//! [`AuthenticationGate`] decides, for every password sign-in, whether the
//! password is checked at all, and keeps the account and origin counters up to
//! date afterwards. Checks run in this order:
//!
//! 1. origin lock (before anything reveals whether the account exists)
//! 2. account lookup and active flag
//! 3. account lock
//! 4. password comparison
//!
//! A locked principal is rejected without comparing the password. Store
//! failures abort the call with an error and are never read as "not locked".
//!
//! # Example
//!
//! ```rust,ignore
//! let gate = AuthenticationGate::new(accounts, store, verifier, clock, LockoutConfig::default())?;
//!
//! let ctx = RequestContext::from_forwarded_for(Some("203.0.113.7"), Some("Mozilla/5.0"));
//! match gate.authenticate("a@x.com", "hunter2", &ctx).await? {
//!     AuthOutcome::Success { account_id, role, .. } => { /* issue a session */ }
//!     outcome => { /* show outcome.message(now) */ }
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    AccountId, Clock, Error, LockStatus, LockoutConfig, Principal, Role, Scope,
    account::normalize_identifier,
    crypto::PasswordVerifier,
    error::ValidationError,
    principal::remaining_seconds,
    repositories::{AccountRepository, AttemptStore},
    services::LoginAttemptTracker,
};

/// Origin key used when the request carries none.
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// Request metadata the gate needs besides the credentials.
///
/// Both values are opaque to the gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub origin: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn new(origin: Option<String>, user_agent: Option<String>) -> Self {
        Self { origin, user_agent }
    }

    /// Build from an `X-Forwarded-For` value, keeping the first (client) hop.
    pub fn from_forwarded_for(forwarded_for: Option<&str>, user_agent: Option<&str>) -> Self {
        let origin = forwarded_for
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(str::to_string);

        Self {
            origin,
            user_agent: user_agent.map(str::to_string),
        }
    }

    /// The origin principal key.
    pub fn origin_key(&self) -> &str {
        self.origin
            .as_deref()
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .unwrap_or(UNKNOWN_ORIGIN)
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }
}

/// The result of a sign-in attempt.
///
/// Declined sign-ins are ordinary outcomes, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AuthOutcome {
    /// The password was not checked (or this failure triggered the lock).
    Locked { scope: Scope, until: DateTime<Utc> },
    AccountNotFound,
    AccountDisabled,
    InvalidPassword,
    Success {
        account_id: AccountId,
        email: String,
        name: Option<String>,
        role: Role,
    },
}

impl AuthOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AuthOutcome::Success { .. })
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, AuthOutcome::Locked { .. })
    }

    /// Seconds until a lock lifts, rounded up. `None` for anything but `Locked`.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        match self {
            AuthOutcome::Locked { until, .. } => Some(remaining_seconds(*until, now)),
            _ => None,
        }
    }

    /// User-facing message. Locks reveal the remaining time and nothing else.
    pub fn message(&self, now: DateTime<Utc>) -> String {
        match self {
            AuthOutcome::Locked { scope, until } => {
                let secs = remaining_seconds(*until, now);
                match scope {
                    Scope::Account => format!("Account locked. Try again in {secs} seconds."),
                    Scope::Origin => {
                        format!("Too many attempts from this network. Try again in {secs} seconds.")
                    }
                }
            }
            // Distinct from InvalidPassword, which lets callers enumerate accounts.
            AuthOutcome::AccountNotFound => "No user found with this email".to_string(),
            AuthOutcome::AccountDisabled => "Account has been deactivated".to_string(),
            AuthOutcome::InvalidPassword => "Invalid password".to_string(),
            AuthOutcome::Success { .. } => "Signed in".to_string(),
        }
    }
}

/// Guards password verification with account and origin lockout.
pub struct AuthenticationGate<A: AccountRepository, S: AttemptStore> {
    accounts: Arc<A>,
    store: Arc<S>,
    verifier: Arc<dyn PasswordVerifier>,
    clock: Arc<dyn Clock>,
    config: LockoutConfig,
}

impl<A: AccountRepository, S: AttemptStore> AuthenticationGate<A, S> {
    /// Create a gate. Fails if `config` does not validate.
    pub fn new(
        accounts: Arc<A>,
        store: Arc<S>,
        verifier: Arc<dyn PasswordVerifier>,
        clock: Arc<dyn Clock>,
        config: LockoutConfig,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            accounts,
            store,
            verifier,
            clock,
            config,
        })
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Tracker for an account identifier (normalized here).
    pub fn account_tracker(&self, identifier: &str) -> LoginAttemptTracker<S> {
        self.tracker(Principal::account(normalize_identifier(identifier)))
    }

    pub fn origin_tracker(&self, origin: &str) -> LoginAttemptTracker<S> {
        self.tracker(Principal::origin(origin))
    }

    fn tracker(&self, principal: Principal) -> LoginAttemptTracker<S> {
        let policy = self.config.scope(principal.scope()).policy();
        LoginAttemptTracker::new(self.store.clone(), self.clock.clone(), principal, policy)
            .with_enabled(self.config.enabled)
    }

    /// Decide a password sign-in.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::MissingField`] for an empty identifier or
    /// password, and propagates store, lookup and verifier failures.
    pub async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<AuthOutcome, Error> {
        if identifier.trim().is_empty() {
            return Err(ValidationError::MissingField("identifier".to_string()).into());
        }
        if password.is_empty() {
            return Err(ValidationError::MissingField("password".to_string()).into());
        }

        let identifier = normalize_identifier(identifier);
        let result = self.evaluate(&identifier, password, ctx).await;

        match &result {
            Ok(outcome) => tracing::debug!(
                identifier = %identifier,
                origin = ctx.origin_key(),
                outcome = ?outcome,
                "Sign-in evaluated"
            ),
            Err(e) => tracing::error!(
                identifier = %identifier,
                origin = ctx.origin_key(),
                error = %e,
                "Sign-in aborted"
            ),
        }

        result
    }

    async fn evaluate(
        &self,
        identifier: &str,
        password: &str,
        ctx: &RequestContext,
    ) -> Result<AuthOutcome, Error> {
        let origin = self.origin_tracker(ctx.origin_key());
        if let LockStatus::LockedUntil(until) = origin.check_locked().await? {
            return Ok(AuthOutcome::Locked {
                scope: Scope::Origin,
                until,
            });
        }

        let Some(account) = self.accounts.find_by_identifier(identifier).await? else {
            if self.config.count_unknown_accounts {
                if let LockStatus::LockedUntil(until) =
                    origin.record_failure(ctx.user_agent()).await?
                {
                    return Ok(AuthOutcome::Locked {
                        scope: Scope::Origin,
                        until,
                    });
                }
            }
            return Ok(AuthOutcome::AccountNotFound);
        };

        if !account.is_active {
            return Ok(AuthOutcome::AccountDisabled);
        }

        let account_tracker = self.account_tracker(identifier);
        if let LockStatus::LockedUntil(until) = account_tracker.check_locked().await? {
            return Ok(AuthOutcome::Locked {
                scope: Scope::Account,
                until,
            });
        }

        if !self
            .verifier
            .verify(password, &account.password_hash)
            .await?
        {
            let (account_status, origin_status) = tokio::join!(
                account_tracker.record_failure(ctx.user_agent()),
                origin.record_failure(ctx.user_agent()),
            );

            // The account lock is the more specific signal when both trip at once.
            return Ok(match (account_status?, origin_status?) {
                (LockStatus::LockedUntil(until), _) => AuthOutcome::Locked {
                    scope: Scope::Account,
                    until,
                },
                (_, LockStatus::LockedUntil(until)) => AuthOutcome::Locked {
                    scope: Scope::Origin,
                    until,
                },
                _ => AuthOutcome::InvalidPassword,
            });
        }

        tokio::try_join!(account_tracker.record_success(), origin.record_success())?;

        Ok(AuthOutcome::Success {
            account_id: account.id,
            email: account.email,
            name: account.name,
            role: account.role,
        })
    }

    /// Clear an account's counter and lock, e.g. after a password reset.
    ///
    /// Returns `true` if the account was locked.
    pub async fn unlock_account(&self, identifier: &str) -> Result<bool, Error> {
        self.account_tracker(identifier).unlock().await
    }

    /// Clear an origin's counter and lock.
    pub async fn unlock_origin(&self, origin: &str) -> Result<bool, Error> {
        self.origin_tracker(origin).unlock().await
    }

    /// Start the background cleanup task.
    ///
    /// Periodically purges records that have no failures and no active lock.
    /// Stops when `shutdown` changes.
    pub fn start_cleanup_task(
        &self,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let clock = Arc::clone(&self.clock);
        let period = self
            .config
            .cleanup_interval
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(3600));

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        match store.purge_stale(clock.now()).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(
                                    count = count,
                                    "Purged stale login attempt records"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "Failed to purge login attempt records"
                                );
                            }
                            _ => {}
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down login attempt cleanup task");
                        break;
                    }
                }
            }
        })
    }
}
