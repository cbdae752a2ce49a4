//! `PostgreSQL` data layer for the Whisker economy.
//!
//! Implements the economy's [`EconomyStore`](whisker_economy::EconomyStore)
//! transaction boundary on top of [`sqlx`], and owns the schema migrations.
//!
//! # Modules
//!
//! - [`postgres`] -- Connection pool and migrations
//! - [`store`] -- [`PgStore`]: the economy store over one pool
//! - [`error`] -- Shared error types

pub mod error;
pub mod postgres;
mod rows;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use postgres::PostgresPool;
pub use store::{AuditRow, PgStore, PgTx};
