//! Connection pool for the economy database.
//!
//! Queries are built at runtime, so the crate compiles without a live
//! database. Schema changes ship as `migrations/` and run at startup.

use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

use crate::error::DbError;
use crate::store::PgStore;

/// How long an operation waits for a free connection before failing.
///
/// Transactions hold their user's row lock while they wait, so this stays
/// short.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool of connections to the economy database.
#[derive(Clone)]
pub struct PostgresPool {
    pool: PgPool,
}

impl PostgresPool {
    /// Connect to `url` with at most `max_connections` open at once.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed and
    /// [`DbError::Postgres`] if the server cannot be reached.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_with(options)
            .await?;

        tracing::info!(max_connections, "connected to economy database");
        Ok(Self { pool })
    }

    /// Bring the schema up to date.
    pub async fn run_migrations(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("economy schema migrated");
        Ok(())
    }

    /// An economy store sharing this pool.
    pub fn store(&self) -> PgStore {
        PgStore::new(self.pool.clone())
    }

    /// Wait for in-flight transactions, then close every connection.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("economy database pool closed");
    }
}
