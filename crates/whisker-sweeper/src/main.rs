//! Survival sweeper for the Whisker economy.
//!
//! Loads `whisker-config.yaml` (path overridable with `WHISKER_CONFIG`),
//! connects to `PostgreSQL`, applies migrations, then runs the survival and
//! cleanup sweep every `infrastructure.sweep_interval_secs` until Ctrl-C.
//!
//! Chat front-ends evaluate a user's cats on every interaction; this
//! process catches the users who stopped interacting.

mod error;
mod sweeper;

use std::path::Path;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use whisker_db::PostgresPool;
use whisker_economy::EconomyConfig;

use crate::error::SweeperError;
use crate::sweeper::Sweeper;

/// Config file used when `WHISKER_CONFIG` is not set.
const DEFAULT_CONFIG_PATH: &str = "whisker-config.yaml";

/// Load the config file, or run on defaults when it does not exist.
fn load_config(path: &Path) -> Result<EconomyConfig, SweeperError> {
    if path.exists() {
        return Ok(EconomyConfig::from_file(path)?);
    }
    warn!(path = %path.display(), "config file not found, using defaults");
    let mut config = EconomyConfig::default();
    config.infrastructure.apply_env_overrides();
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, running until killed");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<(), SweeperError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("whisker-sweeper starting");

    let path = std::env::var("WHISKER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = load_config(Path::new(&path))?;
    info!(
        mode = ?config.survival.mode,
        sweep_interval_secs = config.infrastructure.sweep_interval_secs,
        "configuration loaded"
    );

    let pool = PostgresPool::connect(
        &config.infrastructure.postgres_url,
        config.infrastructure.postgres_max_connections,
    )
    .await?;
    pool.run_migrations().await?;

    let sweeper = Sweeper::new(
        pool.store(),
        config.survival,
        config.infrastructure.sweep_interval_secs,
    );
    sweeper.run(shutdown_signal()).await;

    pool.close().await;
    info!("whisker-sweeper stopped");
    Ok(())
}
