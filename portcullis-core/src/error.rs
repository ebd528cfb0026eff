use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password hash error: {0}")]
    PasswordHash(String),
}

#[derive(Debug, Error)]
pub enum StorageError {
    /// The attempt store could not complete the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Record not found")]
    NotFound,
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),
}

impl Error {
    /// Whether the error means attempt state could not be read or written.
    ///
    /// Callers must treat this as a declined login, never as "not locked".
    pub fn is_store_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::Unavailable(_)) | Error::Storage(StorageError::Database(_))
        )
    }

    pub fn is_validation_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Maps backend errors into [`StorageError::Database`], logging them first.
///
/// ```rust,ignore
/// use portcullis_core::error::DatabaseResultExt;
///
/// query
///     .execute(&pool)
///     .await
///     .map_db_err_with_context("Failed to reset attempts")?;
/// ```
pub trait DatabaseResultExt<T> {
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{context}");
            Error::Storage(StorageError::Database(format!("{context}: {e}")))
        })
    }
}
