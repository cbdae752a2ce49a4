//! The periodic survival sweep.
//!
//! Each pass evaluates every user that owns at least one cat (neglect,
//! death, runaway and dead-record cleanup) in per-user transactions. A
//! failed pass is logged and retried at the next interval.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use whisker_economy::config::SurvivalConfig;
use whisker_economy::{EconomyError, EconomyStore, SweepReport, sweep};

/// Runs [`sweep`] on a fixed interval.
pub struct Sweeper<S> {
    store: S,
    config: SurvivalConfig,
    interval: Duration,
}

impl<S: EconomyStore> Sweeper<S> {
    /// Create a sweeper. An interval of zero is raised to one second.
    pub fn new(store: S, config: SurvivalConfig, interval_secs: u64) -> Self {
        Self {
            store,
            config,
            interval: Duration::from_secs(interval_secs.max(1)),
        }
    }

    /// Run a single pass at `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SweepReport, EconomyError> {
        let report = sweep(&self.store, &self.config, now).await?;
        info!(
            users = report.users,
            failed = report.failed,
            died = report.totals.died,
            neglected = report.totals.neglected,
            recovered = report.totals.recovered,
            released = report.totals.released,
            "sweep pass complete"
        );
        Ok(report)
    }

    /// Sweep on every interval tick until `shutdown` resolves.
    ///
    /// The first pass runs immediately.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        warn!(error = %e, "sweep pass failed, retrying next interval");
                    }
                }
                () = &mut shutdown => {
                    info!("shutdown requested, sweeper stopping");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::{TimeDelta, TimeZone};
    use rust_decimal_macros::dec;
    use whisker_economy::MemoryStore;
    use whisker_types::{
        CatalogEntry, CatalogEntryId, OwnershipRecord, OwnershipStatus, Rarity, UserId,
    };

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(|| panic!("fixed timestamp is valid"))
    }

    async fn store_with_cat() -> (MemoryStore, UserId) {
        let entry = CatalogEntry {
            id: CatalogEntryId::new(),
            name: "Tabby".to_owned(),
            rarity: Rarity::Common,
            rate_amount: dec!(1),
            rate_interval_secs: 60,
            price: 10,
            active: true,
            available_from: None,
            available_until: None,
            pools: BTreeSet::from(["standard".to_owned()]),
        };
        let store = MemoryStore::new();
        let user = UserId::new();
        store.insert_catalog_entry(entry.clone()).await;
        store.seed_ownership(OwnershipRecord::acquire(user, &entry, t0())).await;
        (store, user)
    }

    #[tokio::test]
    async fn a_pass_applies_deadlines() {
        let (store, user) = store_with_cat().await;
        let sweeper = Sweeper::new(store.clone(), SurvivalConfig::default(), 60);

        let report = sweeper
            .run_once(t0() + TimeDelta::days(4))
            .await
            .unwrap_or_else(|e| panic!("sweep failed: {e}"));
        assert_eq!((report.users, report.totals.died), (1, 1));

        let snapshot = store.snapshot().await;
        let status = snapshot.ownerships_of(user).first().map(|r| r.status);
        assert_eq!(status, Some(OwnershipStatus::Dead));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let (store, _) = store_with_cat().await;
        let sweeper = Sweeper::new(store, SurvivalConfig::default(), 0);
        let shutdown = tokio::time::sleep(std::time::Duration::from_secs(5));
        sweeper.run(shutdown).await;
    }
}
