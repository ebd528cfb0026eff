//! Password hash comparison.
//!
//! The gate only ever compares a plaintext password against a stored hash.
//! Hashing is deliberately slow, so the default verifier runs on the blocking
//! thread pool.

use async_trait::async_trait;

use crate::{Error, error::AuthError};

/// Compares a plaintext password with a stored hash.
#[async_trait]
pub trait PasswordVerifier: Send + Sync + 'static {
    async fn verify(&self, plaintext: &str, stored_hash: &str) -> Result<bool, Error>;
}

/// Verifies PHC-format hashes (argon2, scrypt, pbkdf2) with `password-auth`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Argon2PasswordVerifier;

#[async_trait]
impl PasswordVerifier for Argon2PasswordVerifier {
    async fn verify(&self, plaintext: &str, stored_hash: &str) -> Result<bool, Error> {
        let plaintext = plaintext.to_string();
        let stored_hash = stored_hash.to_string();

        tokio::task::spawn_blocking(move || {
            // A malformed stored hash can never match.
            password_auth::verify_password(&plaintext, &stored_hash).is_ok()
        })
        .await
        .map_err(|e| Error::Auth(AuthError::PasswordHash(e.to_string())))
    }
}

/// Hash a password using argon2
pub fn hash_password(password: &str) -> String {
    password_auth::generate_hash(password)
}
