//! Weighted gacha draws with pity.
//!
//! # Draw sequence
//!
//! 1. Load the pool's eligible entries; reject `EmptyPool` if none.
//! 2. Reject `InsufficientFunds` if the user cannot pay. Nothing has been
//!    written at this point.
//! 3. Increment the `(user, pool)` pity counter.
//! 4. If the counter reached the pool's threshold, pick the rarity from the
//!    guaranteed set. Otherwise pick from the full weight table.
//! 5. If the picked rarity has no eligible entries, fall back through the
//!    table order, then through every remaining rarity ascending. A forced
//!    draw tries the qualifying rarities (ascending) before the regular
//!    table.
//! 6. Pick an entry uniformly within the rarity.
//! 7. Charge the price, reset pity on a qualifying rarity, resolve the
//!    acquisition and journal the draw.
//!
//! Steps 3 to 7 happen in one transaction. Ties in the weighted pick go to
//! table order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, CatalogEntry, Rarity, UserId};

use crate::config::{EconomyConfig, PoolConfig, RarityWeight};
use crate::error::EconomyError;
use crate::leveling::{Acquisition, resolve_in_tx};
use crate::outcome::{Outcome, Rejection};
use crate::store::{EconomyStore, StoreTx, debit, record};

/// A successful draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawOutcome {
    /// The entry awarded.
    pub entry: CatalogEntry,
    /// Rarity of the awarded entry (after any bucket fallback).
    pub rarity: Rarity,
    /// Whether pity forced the rarity.
    pub pity_forced: bool,
    /// Pity counter after the draw.
    pub pity: u32,
    /// How the award was absorbed.
    pub acquisition: Acquisition,
    /// Balance after the charge.
    pub balance: i64,
}

/// Result of a multi-draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiDraw {
    /// Draws that completed, in order.
    pub outcomes: Vec<DrawOutcome>,
    /// Why the sequence stopped early, if it did.
    pub stopped: Option<Rejection>,
}

/// Pick a rarity with probability proportional to its weight.
///
/// Non-positive and non-finite weights never win. Returns `None` when no
/// weight is positive.
pub fn weighted_rarity(table: &[RarityWeight], rng: &mut impl Rng) -> Option<Rarity> {
    let usable = || {
        table
            .iter()
            .filter(|w| w.weight.is_finite() && w.weight > 0.0)
    };
    let total: f64 = usable().map(|w| w.weight).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let point = rng.random_range(0.0..total);
    let mut cumulative = 0.0;
    for w in usable() {
        cumulative += w.weight;
        if point <= cumulative {
            return Some(w.rarity);
        }
    }
    // Float accumulation can fall a hair short of `total`.
    usable().last().map(|w| w.rarity)
}

/// Fallback order for an empty bucket: `table`, then `then`, then every
/// rarity ascending.
fn fallback_order(table: &[RarityWeight], then: impl IntoIterator<Item = Rarity>) -> Vec<Rarity> {
    let mut order: Vec<Rarity> = Vec::with_capacity(Rarity::ALL.len());
    let listed = table.iter().map(|w| w.rarity).chain(then).chain(Rarity::ALL);
    for rarity in listed {
        if !order.contains(&rarity) {
            order.push(rarity);
        }
    }
    order
}

/// Choose the rarity and entry for one draw.
///
/// `pity` is the counter value after incrementing.
fn select<'a>(
    eligible: &'a [CatalogEntry],
    pool: &PoolConfig,
    pity: u32,
    rng: &mut impl Rng,
) -> Option<(&'a CatalogEntry, bool)> {
    let mut buckets: BTreeMap<Rarity, Vec<&CatalogEntry>> = BTreeMap::new();
    for entry in eligible {
        buckets.entry(entry.rarity).or_default().push(entry);
    }

    let forced = pity >= pool.pity_threshold;
    let (picked, order) = if forced {
        let qualifying = Rarity::ALL
            .into_iter()
            .filter(|r| *r >= pool.qualifying_rarity);
        let regular = pool.weights.iter().map(|w| w.rarity);
        (
            weighted_rarity(&pool.guaranteed, rng),
            fallback_order(&pool.guaranteed, qualifying.chain(regular)),
        )
    } else {
        (
            weighted_rarity(&pool.weights, rng),
            fallback_order(&pool.weights, core::iter::empty::<Rarity>()),
        )
    };

    let bucket = picked
        .and_then(|r| buckets.get(&r))
        .or_else(|| order.iter().find_map(|r| buckets.get(r)))?;
    let index = rng.random_range(0..bucket.len());
    bucket.get(index).map(|entry| (*entry, forced))
}

/// Draw once from `pool` for `price`.
pub async fn draw<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    pool: &str,
    price: i64,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Outcome<DrawOutcome> {
    if price < 0 {
        return Ok(Err(Rejection::invalid("price must not be negative")));
    }

    let mut tx = store.begin().await?;
    let outcome = match draw_in_tx(&mut tx, config, user, pool, price, now, rng).await? {
        Ok(outcome) => outcome,
        Err(rejection) => {
            tracing::debug!(user_id = %user, pool, %rejection, "draw rejected");
            return Ok(Err(rejection));
        }
    };
    tx.commit().await?;

    tracing::debug!(
        user_id = %user,
        pool,
        rarity = %outcome.rarity,
        pity = outcome.pity,
        forced = outcome.pity_forced,
        "draw resolved"
    );
    Ok(Ok(outcome))
}

async fn draw_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &EconomyConfig,
    user: UserId,
    pool: &str,
    price: i64,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Outcome<DrawOutcome> {
    let account = tx.lock_user(user, now).await?;
    let eligible = tx.list_eligible_entries(pool, now).await?;
    if eligible.is_empty() {
        return Ok(Err(Rejection::EmptyPool {
            pool: pool.to_owned(),
        }));
    }
    if account.balance < price {
        return Ok(Err(Rejection::InsufficientFunds {
            required: price,
            available: account.balance,
        }));
    }

    let pool_config = config.gacha.pool(pool);
    let pity = tx.get_pity(user, pool).await?.saturating_add(1);
    let Some((entry, pity_forced)) = select(&eligible, pool_config, pity, rng) else {
        return Ok(Err(Rejection::EmptyPool {
            pool: pool.to_owned(),
        }));
    };
    let entry = entry.clone();

    let balance = match debit(tx, user, price, account.balance).await? {
        Ok(balance) => balance,
        Err(rejection) => return Ok(Err(rejection)),
    };

    let pity = if entry.rarity >= pool_config.qualifying_rarity {
        0
    } else {
        pity
    };
    tx.set_pity(user, pool, pity).await?;

    let acquisition = resolve_in_tx(tx, config, user, &entry, now).await?;
    let amount = price
        .checked_neg()
        .ok_or_else(|| EconomyError::overflow("draw price"))?;
    record(
        tx,
        AuditEntryBuilder::new(user, AuditAction::Draw)
            .amount(amount)
            .reference(entry.id)
            .metadata(json!({
                "pool": pool,
                "rarity": entry.rarity,
                "pity": pity,
                "pity_forced": pity_forced,
            }))
            .at(now),
    )
    .await?;

    Ok(Ok(DrawOutcome {
        rarity: entry.rarity,
        entry,
        pity_forced,
        pity,
        acquisition,
        balance,
    }))
}

/// Draw up to `count` times, each draw charged and committed on its own.
///
/// Stops at the first rejection; completed draws stay committed.
#[allow(clippy::too_many_arguments)]
pub async fn draw_multi<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    pool: &str,
    price: i64,
    count: u32,
    now: DateTime<Utc>,
    rng: &mut impl Rng,
) -> Outcome<MultiDraw> {
    if count == 0 {
        return Ok(Err(Rejection::invalid("draw count must be at least 1")));
    }

    let mut outcomes = Vec::new();
    for _ in 0..count {
        match draw(store, config, user, pool, price, now, rng).await? {
            Ok(outcome) => outcomes.push(outcome),
            Err(rejection) => {
                return Ok(Ok(MultiDraw {
                    outcomes,
                    stopped: Some(rejection),
                }));
            }
        }
    }
    Ok(Ok(MultiDraw {
        outcomes,
        stopped: None,
    }))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use whisker_ledger::{Balances, ReconcileResult};
    use whisker_types::AcquisitionKind;

    use super::*;
    use crate::testkit::{POOL, balance, done, entry, ok, rejected, rng, store_with, t0};

    fn only(rarity: Rarity, weight: f64) -> Vec<RarityWeight> {
        vec![RarityWeight::new(rarity, weight)]
    }

    fn scenario_config() -> EconomyConfig {
        let mut config = EconomyConfig::default();
        config.gacha.default_pool.weights = only(Rarity::Common, 1.0);
        config.gacha.default_pool.pity_threshold = 100;
        config
    }

    #[test]
    fn zero_weight_never_wins() {
        let table = [
            RarityWeight::new(Rarity::Common, 0.0),
            RarityWeight::new(Rarity::Rare, 1.0),
            RarityWeight::new(Rarity::Epic, -3.0),
        ];
        let mut rng = rng();
        for _ in 0..500 {
            assert_eq!(weighted_rarity(&table, &mut rng), Some(Rarity::Rare));
        }
    }

    #[test]
    fn all_zero_weights_pick_nothing() {
        let table = [RarityWeight::new(Rarity::Common, 0.0)];
        assert_eq!(weighted_rarity(&table, &mut rng()), None);
    }

    #[test]
    fn weights_are_roughly_proportional() {
        let table = [
            RarityWeight::new(Rarity::Common, 3.0),
            RarityWeight::new(Rarity::Rare, 1.0),
        ];
        let mut rng = rng();
        let commons = (0..4000)
            .filter(|_| weighted_rarity(&table, &mut rng) == Some(Rarity::Common))
            .count();
        assert!((2800..3200).contains(&commons), "commons = {commons}");
    }

    #[test]
    fn fallback_follows_table_then_ascending() {
        let table = [
            RarityWeight::new(Rarity::Legendary, 1.0),
            RarityWeight::new(Rarity::Rare, 1.0),
        ];
        let order = fallback_order(&table, core::iter::empty::<Rarity>());
        assert_eq!(
            order,
            vec![
                Rarity::Legendary,
                Rarity::Rare,
                Rarity::Common,
                Rarity::Epic,
                Rarity::Mythic,
                Rarity::Divine,
            ]
        );
    }

    #[test]
    fn forced_fallback_prefers_qualifying_rarities() {
        let guaranteed = [RarityWeight::new(Rarity::Mythic, 1.0)];
        let qualifying = Rarity::ALL.into_iter().filter(|r| *r >= Rarity::Epic);
        let regular = [Rarity::Common, Rarity::Rare];
        let order = fallback_order(&guaranteed, qualifying.chain(regular));
        assert_eq!(
            order,
            vec![
                Rarity::Mythic,
                Rarity::Epic,
                Rarity::Legendary,
                Rarity::Divine,
                Rarity::Common,
                Rarity::Rare,
            ]
        );
    }

    #[tokio::test]
    async fn empty_guaranteed_bucket_falls_back_to_a_qualifying_cat() {
        let common = entry("Tabby", Rarity::Common, dec!(1), 60, 0);
        let legendary = entry("Lynx", Rarity::Legendary, dec!(1), 60, 0);
        let (store, user) = store_with(0, &[common, legendary.clone()]).await;
        let mut config = EconomyConfig::default();
        config.gacha.default_pool.pity_threshold = 1;
        config.gacha.default_pool.qualifying_rarity = Rarity::Epic;
        // No eligible Mythic, so the guaranteed pick always misses.
        config.gacha.default_pool.guaranteed = only(Rarity::Mythic, 1.0);

        let mut rng = rng();
        for _ in 0..20 {
            let o = ok(draw(&store, &config, user, POOL, 0, t0(), &mut rng).await);
            assert!(o.pity_forced);
            assert_eq!(o.entry.id, legendary.id);
            assert_eq!(o.pity, 0);
        }
    }

    #[tokio::test]
    async fn scenario_single_entry_pool() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(100, &[cat.clone()]).await;
        let outcome = ok(draw(&store, &scenario_config(), user, POOL, 10, t0(), &mut rng()).await);

        assert_eq!(outcome.entry.id, cat.id);
        assert_eq!(outcome.acquisition.kind, AcquisitionKind::New);
        assert_eq!(outcome.balance, 90);
        assert_eq!(outcome.pity, 1);
        assert_eq!(balance(&store, user).await, 90);
        assert_eq!(store.snapshot().await.pity(user, POOL), 1);
    }

    #[tokio::test]
    async fn scenario_twenty_five_duplicates_level_up() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(1_000, &[cat.clone()]).await;
        let config = scenario_config();
        let mut rng = rng();

        ok(draw(&store, &config, user, POOL, 10, t0(), &mut rng).await);
        for _ in 0..24 {
            let o = ok(draw(&store, &config, user, POOL, 10, t0(), &mut rng).await);
            assert!(!o.acquisition.leveled_up);
        }
        let last = ok(draw(&store, &config, user, POOL, 10, t0(), &mut rng).await);
        assert!(last.acquisition.leveled_up);

        let snapshot = store.snapshot().await;
        let rec = snapshot.ownership(user, cat.id).cloned();
        assert_eq!(rec.map(|r| (r.level, r.dup_count)), Some((2, 0)));
        assert_eq!(snapshot.user(user).map(|u| u.balance), Some(740));
    }

    #[tokio::test]
    async fn empty_pool_is_rejected_without_writes() {
        let mut cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        cat.active = false;
        let (store, user) = store_with(100, &[cat]).await;
        let rejection = rejected(draw(&store, &scenario_config(), user, POOL, 10, t0(), &mut rng()).await);
        assert_eq!(rejection, Rejection::EmptyPool { pool: POOL.to_owned() });
        assert_eq!(balance(&store, user).await, 100);
    }

    #[tokio::test]
    async fn divine_entries_are_never_drawn() {
        let cat = entry("Seraph", Rarity::Divine, dec!(1), 60, 10);
        let (store, user) = store_with(100, &[cat]).await;
        let rejection = rejected(draw(&store, &scenario_config(), user, POOL, 10, t0(), &mut rng()).await);
        assert!(matches!(rejection, Rejection::EmptyPool { .. }));
    }

    #[tokio::test]
    async fn insufficient_funds_leaves_pity_untouched() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(5, &[cat]).await;
        let rejection = rejected(draw(&store, &scenario_config(), user, POOL, 10, t0(), &mut rng()).await);
        assert_eq!(
            rejection,
            Rejection::InsufficientFunds {
                required: 10,
                available: 5
            }
        );
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.pity(user, POOL), 0);
        assert!(snapshot.journal().is_empty());
        assert_eq!(snapshot.user(user).map(|u| u.balance), Some(5));
    }

    #[tokio::test]
    async fn pity_forces_guaranteed_tier_on_threshold_draw() {
        let common = entry("Tabby", Rarity::Common, dec!(1), 60, 0);
        let epic = entry("Bengal", Rarity::Epic, dec!(1), 60, 0);
        let (store, user) = store_with(0, &[common, epic.clone()]).await;
        let mut config = EconomyConfig::default();
        // Only commons can come up unless pity forces the guaranteed set.
        config.gacha.default_pool.weights = only(Rarity::Common, 1.0);
        config.gacha.default_pool.pity_threshold = 5;
        config.gacha.default_pool.guaranteed = only(Rarity::Epic, 1.0);
        let mut rng = rng();

        for expected in 1..5 {
            let o = ok(draw(&store, &config, user, POOL, 0, t0(), &mut rng).await);
            assert_eq!(o.rarity, Rarity::Common);
            assert_eq!(o.pity, expected);
        }
        let fifth = ok(draw(&store, &config, user, POOL, 0, t0(), &mut rng).await);
        assert!(fifth.pity_forced);
        assert_eq!(fifth.entry.id, epic.id);
        assert_eq!(fifth.pity, 0);
    }

    #[tokio::test]
    async fn qualifying_pull_resets_pity() {
        let epic = entry("Bengal", Rarity::Epic, dec!(1), 60, 0);
        let (store, user) = store_with(0, &[epic]).await;
        let o = ok(draw(&store, &EconomyConfig::default(), user, POOL, 0, t0(), &mut rng()).await);
        // Whatever rarity was picked, the only bucket is Epic.
        assert_eq!(o.rarity, Rarity::Epic);
        assert_eq!(o.pity, 0);
    }

    #[tokio::test]
    async fn named_pool_uses_its_own_table() {
        let mut event_cat = entry("Pumpkin", Rarity::Rare, dec!(1), 60, 0);
        event_cat.pools = ["halloween".to_owned()].into();
        let (store, user) = store_with(0, &[event_cat.clone()]).await;
        let mut config = EconomyConfig::default();
        let halloween = PoolConfig {
            weights: only(Rarity::Rare, 1.0),
            qualifying_rarity: Rarity::Rare,
            ..PoolConfig::default()
        };
        config.gacha.pools.insert("halloween".to_owned(), halloween);

        let o = ok(draw(&store, &config, user, "halloween", 0, t0(), &mut rng()).await);
        assert_eq!(o.entry.id, event_cat.id);
        assert_eq!(o.pity, 0);
        assert_eq!(store.snapshot().await.pity(user, POOL), 0);
    }

    #[tokio::test]
    async fn multi_draw_stops_at_first_rejection() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(35, &[cat]).await;
        let multi = ok(draw_multi(&store, &scenario_config(), user, POOL, 10, 10, t0(), &mut rng()).await);
        assert_eq!(multi.outcomes.len(), 3);
        assert!(matches!(multi.stopped, Some(Rejection::InsufficientFunds { .. })));
        assert_eq!(balance(&store, user).await, 5);
    }

    #[tokio::test]
    async fn balance_never_negative_and_journal_reconciles() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 7);
        let (store, user) = store_with(50, &[cat]).await;
        let config = scenario_config();
        let mut rng = rng();
        for _ in 0..20 {
            let _ = done(draw(&store, &config, user, POOL, 7, t0(), &mut rng).await);
            assert!(balance(&store, user).await >= 0);
        }
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.journal().entries_of(user, AuditAction::Draw).len(), 7);
        let closing = Balances {
            currency: balance(&store, user).await,
            essence: 0,
        };
        assert_eq!(
            snapshot.journal().reconcile(user, Balances { currency: 50, essence: 0 }, closing),
            ReconcileResult::Balanced
        );
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_charge_and_pity() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(100, &[cat]).await;
        store.fail_next_commit();
        let result = draw(&store, &scenario_config(), user, POOL, 10, t0(), &mut rng()).await;
        assert!(result.is_err());
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.user(user).map(|u| u.balance), Some(100));
        assert_eq!(snapshot.pity(user, POOL), 0);
        assert!(snapshot.ownerships_of(user).is_empty());
    }
}
