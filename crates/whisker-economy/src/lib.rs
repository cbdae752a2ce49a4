//! Idle economy and gacha engine for the Whisker virtual-pet bot.
//!
//! Users earn currency passively from the cats they own, spend it on
//! weighted gacha draws with a pity guarantee, absorb duplicates into
//! levels, and keep their cats alive by feeding and playing with them.
//!
//! # Modules
//!
//! - [`config`] -- [`EconomyConfig`], loaded from YAML with a default for every key.
//! - [`store`] -- The [`EconomyStore`] / [`StoreTx`] transaction boundary.
//! - [`memory`] -- [`MemoryStore`], an in-process store.
//! - [`rate`] -- Per-second production rate of a user.
//! - [`accrual`] -- Offline accrual with tier caps and remainder carry.
//! - [`gacha`] -- Weighted draws, pity, multi-draws.
//! - [`leveling`] -- Duplicate absorption and level-ups.
//! - [`survival`] -- Deadline-driven neglect and death, cleanup sweeps.
//! - [`care`] -- Feed and play on owned cats.
//! - [`vitals`] -- The stat-decay companion.
//! - [`equipment`] -- Item grants and equipment slots.
//! - [`purchase`] -- Direct purchases and operator grants.
//! - [`tiers`] -- Account tier upgrades.
//!
//! # Results
//!
//! Operations return [`Outcome<T>`]: the outer `Result` carries
//! infrastructure failures ([`EconomyError`]), the inner one carries
//! business rejections ([`Rejection`]). A rejection never leaves partial
//! writes behind.
//!
//! # Time
//!
//! Every operation takes `now` explicitly. Nothing in this crate reads
//! the wall clock.
//!
//! ```
//! use chrono::{Duration, TimeZone, Utc};
//! use rust_decimal::Decimal;
//! use whisker_economy::accrual::settle;
//!
//! let last = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
//! let now = last + Duration::seconds(10_000);
//!
//! // 0.01 per second, capped at one hour offline.
//! let claim = settle(Some(last), Decimal::new(1, 2), 3600, now)?;
//! assert_eq!(claim.earned, 36);
//! assert_eq!(claim.seconds_used, 3600);
//! # Ok::<(), whisker_economy::EconomyError>(())
//! ```

pub mod accrual;
pub mod care;
pub mod config;
pub mod equipment;
pub mod error;
pub mod gacha;
pub mod leveling;
pub mod memory;
pub mod outcome;
pub mod purchase;
pub mod rate;
pub mod store;
pub mod survival;
pub mod tiers;
pub mod vitals;

#[cfg(test)]
mod testkit;

pub use accrual::{AccrualClaim, claim_accrual, preview_accrual};
pub use care::{CareAction, CareOutcome, feed, play};
pub use config::{ConfigError, EconomyConfig, SurvivalMode};
pub use equipment::{equip, grant_item, unequip};
pub use error::{EconomyError, StoreError};
pub use gacha::{DrawOutcome, MultiDraw, draw, draw_multi};
pub use leveling::{Acquisition, resolve_acquisition};
pub use memory::MemoryStore;
pub use outcome::{Outcome, Rejection};
pub use purchase::{PurchaseOutcome, grant_entry, purchase};
pub use rate::compute_rate;
pub use store::{BalanceUpdate, EconomyStore, StoreTx};
pub use survival::{SurvivalReport, SweepReport, Transition, evaluate_survival, evaluate_user, sweep};
pub use tiers::{TierUpgrade, upgrade_tier};
pub use vitals::{CompanionTick, feed_companion, play_companion, tick_companion};
