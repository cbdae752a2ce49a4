//! Account tier (shelter level) upgrades.
//!
//! The tier lengthens the accrual cap and adds equipment slots. Upgrading
//! from tier `t` costs `ceil(base_cost * cost_growth^(t - 1))`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, UserId};

use crate::config::TierConfig;
use crate::error::EconomyError;
use crate::outcome::{Outcome, Rejection};
use crate::store::{EconomyStore, StoreTx, debit, record};

/// A completed tier upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierUpgrade {
    /// Tier before the upgrade.
    pub from: u32,
    /// Tier after the upgrade.
    pub to: u32,
    /// Currency charged.
    pub cost: i64,
    /// Balance after the charge.
    pub balance: i64,
}

/// Price of upgrading away from `tier`.
pub fn upgrade_cost(tier: u32, config: &TierConfig) -> Result<i64, EconomyError> {
    let mut cost = Decimal::from(config.base_cost);
    for _ in 1..tier.max(1) {
        cost = cost
            .checked_mul(config.cost_growth)
            .ok_or_else(|| EconomyError::overflow("tier cost"))?;
    }
    i64::try_from(cost.ceil())
        .ok()
        .ok_or_else(|| EconomyError::overflow("tier cost"))
}

/// Raise the user's tier by one, charging [`upgrade_cost`].
pub async fn upgrade_tier<S: EconomyStore>(
    store: &S,
    config: &TierConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Outcome<TierUpgrade> {
    let mut tx = store.begin().await?;
    let account = tx.lock_user(user, now).await?;
    let from = account.tier;
    if from >= config.max_tier {
        return Ok(Err(Rejection::MaxTier { tier: from }));
    }

    let cost = upgrade_cost(from, config)?;
    let balance = match debit(&mut tx, user, cost, account.balance).await? {
        Ok(balance) => balance,
        Err(rejection) => return Ok(Err(rejection)),
    };
    let to = from
        .checked_add(1)
        .ok_or_else(|| EconomyError::overflow("tier"))?;
    tx.set_tier(user, to).await?;

    let amount = cost
        .checked_neg()
        .ok_or_else(|| EconomyError::overflow("tier cost"))?;
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::TierUpgrade)
            .amount(amount)
            .metadata(json!({ "from": from, "to": to }))
            .at(now),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user, from, to, cost, "tier upgraded");
    Ok(Ok(TierUpgrade {
        from,
        to,
        cost,
        balance,
    }))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::testkit::{balance, done, ok, rejected, store_with, t0};

    #[test]
    fn cost_grows_geometrically_and_rounds_up() {
        let config = TierConfig::default();
        assert_eq!(done(upgrade_cost(1, &config)), 1000);
        assert_eq!(done(upgrade_cost(2, &config)), 1800);
        assert_eq!(done(upgrade_cost(3, &config)), 3240);

        let odd = TierConfig {
            base_cost: 10,
            cost_growth: dec!(1.15),
            ..TierConfig::default()
        };
        // 10 * 1.15 = 11.5
        assert_eq!(done(upgrade_cost(2, &odd)), 12);
    }

    #[test]
    fn absurd_growth_overflows_instead_of_wrapping() {
        let config = TierConfig {
            cost_growth: dec!(1000000),
            ..TierConfig::default()
        };
        assert!(upgrade_cost(10, &config).is_err());
    }

    #[tokio::test]
    async fn upgrade_charges_and_raises_tier() {
        let (store, user) = store_with(2_000, &[]).await;
        let upgrade = ok(upgrade_tier(&store, &TierConfig::default(), user, t0()).await);
        assert_eq!((upgrade.from, upgrade.to, upgrade.cost), (1, 2, 1000));
        assert_eq!(balance(&store, user).await, 1000);

        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.user(user).map(|u| u.tier), Some(2));
        assert_eq!(snapshot.journal().entries_of(user, AuditAction::TierUpgrade).len(), 1);
    }

    #[tokio::test]
    async fn upgrade_needs_the_full_price() {
        let (store, user) = store_with(999, &[]).await;
        let rejection = rejected(upgrade_tier(&store, &TierConfig::default(), user, t0()).await);
        assert_eq!(rejection, Rejection::InsufficientFunds { required: 1000, available: 999 });
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.user(user).map(|u| u.tier), Some(1));
    }

    #[tokio::test]
    async fn top_tier_is_final() {
        let (store, user) = store_with(1_000_000, &[]).await;
        let config = TierConfig {
            max_tier: 2,
            ..TierConfig::default()
        };
        ok(upgrade_tier(&store, &config, user, t0()).await);
        let rejection = rejected(upgrade_tier(&store, &config, user, t0()).await);
        assert_eq!(rejection, Rejection::MaxTier { tier: 2 });
    }
}
