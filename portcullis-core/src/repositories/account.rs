use async_trait::async_trait;

use crate::{Account, Error};

/// Read access to the application's accounts.
#[async_trait]
pub trait AccountRepository: Send + Sync + 'static {
    /// Find an account by its normalized identifier (email).
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<Account>, Error>;
}
