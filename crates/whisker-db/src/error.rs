//! Error types for the data layer.
//!
//! Pool setup and migrations report [`DbError`]. Queries issued through the
//! economy's store traits report [`StoreError`] instead, converted with
//! [`backend`] and [`invalid`].

use whisker_economy::StoreError;

/// Errors that can occur while setting up the data layer.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A `PostgreSQL` operation failed.
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// A `PostgreSQL` migration failed.
    #[error("PostgreSQL migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::Backend(err.to_string())
    }
}

/// Wrap a driver error as a store backend failure.
pub(crate) fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// A row that does not fit its Rust type.
pub(crate) fn invalid(what: &str, err: impl core::fmt::Display) -> StoreError {
    StoreError::InvalidData(format!("{what}: {err}"))
}
