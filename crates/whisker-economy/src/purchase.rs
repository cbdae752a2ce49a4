//! Direct catalog purchases and operator grants.
//!
//! A purchase charges the entry's price and resolves the acquisition the
//! same way a draw does, without touching pity. Grants skip the price and
//! the availability checks, which makes them the only way to hand out
//! `Divine` entries.

use chrono::{DateTime, Utc};
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, CatalogEntry, CatalogEntryId, UserId};

use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::leveling::{Acquisition, resolve_in_tx};
use crate::outcome::{Outcome, Rejection};
use crate::store::{EconomyStore, StoreTx, debit, record};

/// A completed purchase or grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOutcome {
    /// The acquired entry.
    pub entry: CatalogEntry,
    /// How the acquisition was absorbed.
    pub acquisition: Acquisition,
    /// Currency charged (zero for grants).
    pub charged: i64,
    /// Balance after the operation.
    pub balance: i64,
}

/// Buy `entry_id` at its catalog price.
pub async fn purchase<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    entry_id: CatalogEntryId,
    now: DateTime<Utc>,
) -> Outcome<PurchaseOutcome> {
    let mut tx = store.begin().await?;
    let account = tx.lock_user(user, now).await?;
    let Some(entry) = tx.get_catalog_entry(entry_id).await? else {
        return Ok(Err(Rejection::NotFound { what: "catalog entry" }));
    };
    if !entry.is_obtainable_at(now) {
        return Ok(Err(Rejection::Unavailable));
    }

    let balance = match debit(&mut tx, user, entry.price, account.balance).await? {
        Ok(balance) => balance,
        Err(rejection) => {
            tracing::debug!(user_id = %user, entry_id = %entry.id, %rejection, "purchase rejected");
            return Ok(Err(rejection));
        }
    };
    let acquisition = resolve_in_tx(&mut tx, config, user, &entry, now).await?;
    let amount = entry
        .price
        .checked_neg()
        .ok_or_else(|| EconomyError::overflow("purchase price"))?;
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::Purchase)
            .amount(amount)
            .reference(entry.id)
            .metadata(json!({ "rarity": entry.rarity, "kind": acquisition.kind }))
            .at(now),
    )
    .await?;
    tx.commit().await?;

    tracing::debug!(user_id = %user, entry_id = %entry.id, price = entry.price, "purchase resolved");
    Ok(Ok(PurchaseOutcome {
        charged: entry.price,
        entry,
        acquisition,
        balance,
    }))
}

/// Give `entry_id` to a user for free.
///
/// Ignores the active flag, the availability window and the rarity's
/// drawability. Only a missing entry is rejected.
pub async fn grant_entry<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    entry_id: CatalogEntryId,
    now: DateTime<Utc>,
) -> Outcome<PurchaseOutcome> {
    let mut tx = store.begin().await?;
    let account = tx.lock_user(user, now).await?;
    let Some(entry) = tx.get_catalog_entry(entry_id).await? else {
        return Ok(Err(Rejection::NotFound { what: "catalog entry" }));
    };

    let acquisition = resolve_in_tx(&mut tx, config, user, &entry, now).await?;
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::Grant)
            .reference(entry.id)
            .metadata(json!({ "rarity": entry.rarity, "kind": acquisition.kind }))
            .at(now),
    )
    .await?;
    tx.commit().await?;

    tracing::info!(user_id = %user, entry_id = %entry.id, rarity = %entry.rarity, "entry granted");
    Ok(Ok(PurchaseOutcome {
        entry,
        acquisition,
        charged: 0,
        balance: account.balance,
    }))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use whisker_ledger::{Balances, ReconcileResult};
    use whisker_types::{AcquisitionKind, Rarity};

    use super::*;
    use crate::testkit::{balance, entry, ok, rejected, store_with, t0};

    #[tokio::test]
    async fn purchase_charges_and_creates_record() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 40);
        let (store, user) = store_with(100, &[cat.clone()]).await;
        let outcome = ok(purchase(&store, &EconomyConfig::default(), user, cat.id, t0()).await);

        assert_eq!(outcome.acquisition.kind, AcquisitionKind::New);
        assert_eq!((outcome.charged, outcome.balance), (40, 60));
        assert_eq!(balance(&store, user).await, 60);

        let snapshot = store.snapshot().await;
        assert!(snapshot.ownership(user, cat.id).is_some());
        assert_eq!(snapshot.journal().entries_of(user, AuditAction::Purchase).len(), 1);
    }

    #[tokio::test]
    async fn second_purchase_is_a_duplicate() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(100, &[cat.clone()]).await;
        let config = EconomyConfig::default();
        ok(purchase(&store, &config, user, cat.id, t0()).await);
        let second = ok(purchase(&store, &config, user, cat.id, t0()).await);
        assert_eq!(second.acquisition.kind, AcquisitionKind::Duplicate);
        assert_eq!(second.acquisition.dup_count, 1);
        assert_eq!(store.snapshot().await.ownerships_of(user).len(), 1);
    }

    #[tokio::test]
    async fn short_balance_leaves_nothing_behind() {
        let cat = entry("Tabby", Rarity::Common, dec!(1), 60, 40);
        let (store, user) = store_with(39, &[cat.clone()]).await;
        let rejection = rejected(purchase(&store, &EconomyConfig::default(), user, cat.id, t0()).await);
        assert_eq!(rejection, Rejection::InsufficientFunds { required: 40, available: 39 });

        let snapshot = store.snapshot().await;
        assert!(snapshot.ownership(user, cat.id).is_none());
        assert!(snapshot.journal().is_empty());
    }

    #[tokio::test]
    async fn unavailable_entries_cannot_be_bought() {
        let mut retired = entry("Retired", Rarity::Rare, dec!(1), 60, 10);
        retired.active = false;
        let mut seasonal = entry("Seasonal", Rarity::Rare, dec!(1), 60, 10);
        seasonal.available_until = Some(t0() - Duration::days(1));
        let divine = entry("Sphinx", Rarity::Divine, dec!(1), 60, 10);
        let (store, user) = store_with(100, &[retired.clone(), seasonal.clone(), divine.clone()]).await;
        let config = EconomyConfig::default();

        for id in [retired.id, seasonal.id, divine.id] {
            let rejection = rejected(purchase(&store, &config, user, id, t0()).await);
            assert_eq!(rejection, Rejection::Unavailable);
        }
        assert_eq!(balance(&store, user).await, 100);
    }

    #[tokio::test]
    async fn unknown_entry_is_not_found() {
        let (store, user) = store_with(100, &[]).await;
        let missing = CatalogEntryId::new();
        let rejection = rejected(purchase(&store, &EconomyConfig::default(), user, missing, t0()).await);
        assert_eq!(rejection, Rejection::NotFound { what: "catalog entry" });
    }

    #[tokio::test]
    async fn grants_hand_out_divine_for_free() {
        let divine = entry("Sphinx", Rarity::Divine, dec!(5), 1, 1_000_000);
        let (store, user) = store_with(0, &[divine.clone()]).await;
        let outcome = ok(grant_entry(&store, &EconomyConfig::default(), user, divine.id, t0()).await);

        assert_eq!(outcome.charged, 0);
        assert_eq!(outcome.acquisition.kind, AcquisitionKind::New);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.journal().entries_of(user, AuditAction::Grant).len(), 1);
        assert_eq!(
            snapshot.journal().reconcile(user, Balances::default(), Balances::default()),
            ReconcileResult::Balanced
        );
    }
}
