//! Production rate calculation.
//!
//! A user's rate is assembled from three sources:
//!
//! - **Base**: the per-second rate of every `Active` cat, optionally
//!   scaled by level and shortened by equipped interval reducers.
//! - **Flat**: `magnitude * quantity` for every held flat item.
//! - **Multiplier**: `magnitude ^ quantity` for every held multiplier item,
//!   all multiplied together. Stacking is exponential in quantity.
//!
//! `rate = (base + flat) * multiplier`, never negative. Reading the rate
//! writes nothing.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use whisker_types::{
    CatalogEntry, Item, ItemEffect, ItemHolding, OwnershipId, OwnershipRecord, OwnershipStatus,
    UserId, rate_per_second,
};

use crate::config::RateConfig;
use crate::error::EconomyError;
use crate::store::{EconomyStore, StoreTx};

/// The parts a rate was assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBreakdown {
    /// Sum of active cats' per-second rates.
    pub base_total: Decimal,
    /// Sum of flat item bonuses.
    pub flat_bonus: Decimal,
    /// Product of multiplier item contributions.
    pub multiplier: Decimal,
    /// Final per-second rate.
    pub rate: Decimal,
}

/// Compute a user's per-second production rate.
pub async fn compute_rate<S: EconomyStore>(
    store: &S,
    config: &RateConfig,
    user: UserId,
) -> Result<Decimal, EconomyError> {
    let mut tx = store.begin().await?;
    let breakdown = rate_in_tx(&mut tx, config, user).await?;
    // Read-only: the transaction is dropped, not committed.
    Ok(breakdown.rate)
}

/// Compute the rate inside an open transaction.
pub async fn rate_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &RateConfig,
    user: UserId,
) -> Result<RateBreakdown, EconomyError> {
    let owned = tx.list_owned_entries(user).await?;
    let equipment = tx.list_equipment(user).await?;
    let holdings = tx.list_holdings(user).await?;
    combine(&owned, &equipment, &holdings, config)
}

/// Assemble a rate from already-loaded records.
pub fn combine(
    owned: &[(OwnershipRecord, CatalogEntry)],
    equipment: &[(OwnershipId, Item)],
    holdings: &[ItemHolding],
    config: &RateConfig,
) -> Result<RateBreakdown, EconomyError> {
    let mut reductions: BTreeMap<OwnershipId, i64> = BTreeMap::new();
    for (ownership, item) in equipment {
        if let ItemEffect::IntervalReduction(secs) = item.effect {
            let total = reductions.entry(*ownership).or_insert(0);
            *total = total.saturating_add(secs.max(0));
        }
    }

    let mut base_total = Decimal::ZERO;
    for (record, entry) in owned {
        if record.status != OwnershipStatus::Active {
            continue;
        }
        let reduction = reductions.get(&record.id).copied().unwrap_or(0);
        let rate = cat_rate(record, entry, reduction, config)?;
        base_total = base_total
            .checked_add(rate)
            .ok_or_else(|| EconomyError::overflow("base rate total"))?;
    }

    let mut flat_bonus = Decimal::ZERO;
    let mut multiplier = Decimal::ONE;
    for holding in holdings {
        match holding.item.effect {
            ItemEffect::Flat(magnitude) => {
                let bonus = magnitude
                    .checked_mul(Decimal::from(holding.quantity))
                    .ok_or_else(|| EconomyError::overflow("flat item bonus"))?;
                flat_bonus = flat_bonus
                    .checked_add(bonus)
                    .ok_or_else(|| EconomyError::overflow("flat bonus total"))?;
            }
            ItemEffect::Multiplier(factor) => {
                let contribution = stacked_multiplier(factor, holding.quantity);
                multiplier = multiplier.checked_mul(contribution).unwrap_or_else(|| {
                    tracing::warn!(item = %holding.item.id, "rate multiplier saturated");
                    Decimal::MAX
                });
            }
            ItemEffect::IntervalReduction(_) => {}
        }
    }

    let sum = base_total
        .checked_add(flat_bonus)
        .ok_or_else(|| EconomyError::overflow("base plus flat bonus"))?;
    let rate = if sum <= Decimal::ZERO || multiplier <= Decimal::ZERO {
        Decimal::ZERO
    } else {
        sum.checked_mul(multiplier).unwrap_or_else(|| {
            tracing::warn!(%sum, %multiplier, "final rate saturated");
            Decimal::MAX
        })
    };

    tracing::debug!(%base_total, %flat_bonus, %multiplier, %rate, "rate computed");

    Ok(RateBreakdown {
        base_total,
        flat_bonus,
        multiplier,
        rate,
    })
}

/// Per-second rate of one cat after interval reduction and level bonus.
///
/// An entry whose own interval is not positive produces nothing, however
/// much reduction is equipped.
fn cat_rate(
    record: &OwnershipRecord,
    entry: &CatalogEntry,
    reduction_secs: i64,
    config: &RateConfig,
) -> Result<Decimal, EconomyError> {
    if entry.rate_interval_secs <= 0 {
        return Ok(Decimal::ZERO);
    }
    let interval = entry.rate_interval_secs.saturating_sub(reduction_secs).max(1);
    let base = rate_per_second(entry.rate_amount, interval);

    if config.level_rate_bonus.is_zero() || record.level <= 1 {
        return Ok(base);
    }
    let extra_levels = Decimal::from(record.level.saturating_sub(1));
    config
        .level_rate_bonus
        .checked_mul(extra_levels)
        .and_then(|bonus| bonus.checked_add(Decimal::ONE))
        .and_then(|scale| base.checked_mul(scale))
        .ok_or_else(|| EconomyError::overflow("level rate bonus"))
}

/// `factor ^ quantity` by repeated multiplication, saturating at
/// [`Decimal::MAX`].
fn stacked_multiplier(factor: Decimal, quantity: u32) -> Decimal {
    let mut product = Decimal::ONE;
    for _ in 0..quantity {
        match product.checked_mul(factor) {
            Some(next) => product = next,
            None => return Decimal::MAX,
        }
        if product.is_zero() || product == Decimal::ONE {
            break;
        }
    }
    product
}
