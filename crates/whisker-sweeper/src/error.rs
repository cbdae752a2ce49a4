//! Error types for the sweeper binary.

use whisker_db::DbError;
use whisker_economy::ConfigError;

/// Errors that stop the sweeper.
#[derive(Debug, thiserror::Error)]
pub enum SweeperError {
    /// The configuration file could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The database could not be reached or migrated.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}
