//! Lockout configuration.
//!
//! Thresholds and lock windows are configured per scope. Durations serialize
//! as whole seconds.
//!
//! ```rust
//! use portcullis_core::LockoutConfig;
//! use chrono::Duration;
//!
//! let config = LockoutConfig::default().with_lock_duration(Duration::seconds(10));
//! assert_eq!(config.account.max_failures, 10);
//! assert_eq!(config.origin.max_failures, 20);
//! config.validate().unwrap();
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{Error, Scope, error::ValidationError, policy::LockoutPolicy};

/// Threshold and lock window for one scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    /// Consecutive failures that trigger a lock. The failure that reaches this
    /// count is the one that locks.
    pub max_failures: u32,

    #[serde(with = "duration_secs")]
    pub lock_duration: Duration,
}

impl ScopeConfig {
    pub fn new(max_failures: u32, lock_duration: Duration) -> Self {
        Self {
            max_failures,
            lock_duration,
        }
    }

    pub fn policy(&self) -> LockoutPolicy {
        LockoutPolicy::new(self.max_failures, self.lock_duration)
    }

    fn validate(&self, scope: Scope) -> Result<(), Error> {
        if self.max_failures == 0 {
            return Err(ValidationError::InvalidConfiguration(format!(
                "{scope} max_failures must be at least 1"
            ))
            .into());
        }
        if self.lock_duration <= Duration::zero() {
            return Err(ValidationError::InvalidConfiguration(format!(
                "{scope} lock_duration must be positive"
            ))
            .into());
        }
        Ok(())
    }
}

/// Configuration for account and origin lockout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// When false, failures are never counted and nothing is ever locked.
    pub enabled: bool,

    pub account: ScopeConfig,

    pub origin: ScopeConfig,

    /// Count a lookup for an unknown account as an origin failure.
    ///
    /// Off by default, which leaves unknown-account probing unbounded per origin.
    pub count_unknown_accounts: bool,

    /// How often the background cleanup task purges stale records.
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            account: ScopeConfig::new(10, Duration::minutes(15)),
            origin: ScopeConfig::new(20, Duration::minutes(15)),
            count_unknown_accounts: false,
            cleanup_interval: Duration::hours(1),
        }
    }
}

impl LockoutConfig {
    /// A configuration with protection turned off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Use the same lock window for both scopes.
    pub fn with_lock_duration(mut self, duration: Duration) -> Self {
        self.account.lock_duration = duration;
        self.origin.lock_duration = duration;
        self
    }

    pub fn with_account_threshold(mut self, max_failures: u32) -> Self {
        self.account.max_failures = max_failures;
        self
    }

    pub fn with_origin_threshold(mut self, max_failures: u32) -> Self {
        self.origin.max_failures = max_failures;
        self
    }

    pub fn with_count_unknown_accounts(mut self, count: bool) -> Self {
        self.count_unknown_accounts = count;
        self
    }

    pub fn scope(&self, scope: Scope) -> &ScopeConfig {
        match scope {
            Scope::Account => &self.account,
            Scope::Origin => &self.origin,
        }
    }

    /// Reject configurations that could never lock or would lock forever.
    pub fn validate(&self) -> Result<(), Error> {
        self.account.validate(Scope::Account)?;
        self.origin.validate(Scope::Origin)?;
        if self.cleanup_interval <= Duration::zero() {
            return Err(ValidationError::InvalidConfiguration(
                "cleanup_interval must be positive".to_string(),
            )
            .into());
        }
        Ok(())
    }
}

mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {secs}")))
    }
}
