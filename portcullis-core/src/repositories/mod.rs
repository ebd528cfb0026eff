//! Repository traits for data access layer
//!
//! This module defines the interfaces the services use to reach storage:
//!
//! - [`AttemptStore`] holds per-principal failure counters and locks
//! - [`AccountRepository`] looks up the accounts being signed into
//!
//! In-memory implementations of both live in [`memory`]; database backends
//! live in their own crates.

pub mod account;
pub mod attempt;
pub mod memory;

pub use account::AccountRepository;
pub use attempt::AttemptStore;
pub use memory::{InMemoryAccountRepository, InMemoryAttemptStore};
