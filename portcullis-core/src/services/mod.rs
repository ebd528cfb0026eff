//! Service layer for lockout logic
//!
//! [`LoginAttemptTracker`] applies the lockout policy to one principal;
//! [`AuthenticationGate`] runs a password sign-in through two of them.

pub mod gate;
pub mod tracker;

pub use gate::{AuthOutcome, AuthenticationGate, RequestContext, UNKNOWN_ORIGIN};
pub use tracker::LoginAttemptTracker;
