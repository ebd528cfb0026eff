//! Core functionality for portcullis
//!
//! This crate holds the brute force protection used during password sign-in:
//! failure counters per account and per network origin, each with its own
//! threshold and timed lock.
//!
//! See [`AuthenticationGate`] for the sign-in entry point, [`LoginAttemptTracker`]
//! for the per-principal state machine, [`LockoutPolicy`] for the lock decision and
//! [`AttemptStore`](repositories::AttemptStore) for the storage contract.
//!
//! Storage backends implement the traits in [`repositories`]; an in-memory
//! backend for single-instance deployments ships with this crate.
pub mod account;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod policy;
pub mod principal;
pub mod repositories;
pub mod services;

pub use account::{Account, AccountId, Role};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LockoutConfig, ScopeConfig};
pub use crypto::{Argon2PasswordVerifier, PasswordVerifier};
pub use error::Error;
pub use policy::{Decision, LockoutPolicy};
pub use principal::{AttemptRecord, AttemptState, LockStatus, LockoutStatus, Principal, Scope};
pub use services::{AuthOutcome, AuthenticationGate, LoginAttemptTracker, RequestContext};
