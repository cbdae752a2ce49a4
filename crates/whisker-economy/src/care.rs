//! Feed and play actions on owned cats.
//!
//! The record is evaluated before the action. A cat whose feed deadline
//! has passed dies right there (the death is committed) and the action is
//! rejected with [`Rejection::EntityDead`]. Otherwise the matching
//! timestamp is stamped, the record becomes `Active` again, the optional
//! cost is charged and a `Care` entry is journaled.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, OwnershipId, OwnershipRecord, OwnershipStatus, UserId};

use crate::config::EconomyConfig;
use crate::error::EconomyError;
use crate::outcome::{Outcome, Rejection};
use crate::store::{EconomyStore, StoreTx, debit, record};
use crate::survival::{apply_transition, evaluate_survival};

/// Which care action to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CareAction {
    /// Resets the feed deadline.
    Feed,
    /// Resets the play deadline.
    Play,
}

/// A completed care action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CareOutcome {
    /// The record after the action.
    pub ownership: OwnershipRecord,
    /// Whether the record was neglected before the action.
    pub revived: bool,
    /// Currency charged.
    pub charged: i64,
    /// Balance after the charge.
    pub balance: i64,
}

/// Feed a cat.
pub async fn feed<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    ownership: OwnershipId,
    now: DateTime<Utc>,
) -> Outcome<CareOutcome> {
    care(store, config, user, ownership, CareAction::Feed, now).await
}

/// Play with a cat.
pub async fn play<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    ownership: OwnershipId,
    now: DateTime<Utc>,
) -> Outcome<CareOutcome> {
    care(store, config, user, ownership, CareAction::Play, now).await
}

/// Perform a care action.
pub async fn care<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    ownership: OwnershipId,
    action: CareAction,
    now: DateTime<Utc>,
) -> Outcome<CareOutcome> {
    let mut tx = store.begin().await?;
    let account = tx.lock_user(user, now).await?;

    let mut current = match tx.get_ownership_by_id(ownership).await? {
        Some(r) if r.user_id == user => r,
        _ => return Ok(Err(Rejection::NotFound { what: "ownership" })),
    };

    let transition = evaluate_survival(&current, &config.survival, now);
    if transition.to == OwnershipStatus::Dead {
        if transition.is_change() {
            apply_transition(&mut tx, &mut current, transition, now).await?;
            tx.commit().await?;
        }
        return Ok(Err(Rejection::EntityDead));
    }

    let cost = match action {
        CareAction::Feed => config.care.feed_cost,
        CareAction::Play => config.care.play_cost,
    };
    let balance = match debit(&mut tx, user, cost, account.balance).await? {
        Ok(balance) => balance,
        Err(rejection) => return Ok(Err(rejection)),
    };

    let revived = current.status == OwnershipStatus::Neglected
        || transition.to == OwnershipStatus::Neglected;
    match action {
        CareAction::Feed => current.last_fed_at = Some(now),
        CareAction::Play => current.last_played_at = Some(now),
    }
    current.set_status(OwnershipStatus::Active, now);
    tx.upsert_ownership(&current).await?;

    let amount = cost
        .checked_neg()
        .ok_or_else(|| EconomyError::overflow("care cost"))?;
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::Care)
            .amount(amount)
            .reference(current.id)
            .metadata(json!({ "action": action, "revived": revived }))
            .at(now),
    )
    .await?;
    tx.commit().await?;

    tracing::debug!(user_id = %user, ownership_id = %current.id, ?action, revived, "care applied");
    Ok(Ok(CareOutcome {
        ownership: current,
        revived,
        charged: cost,
        balance,
    }))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use whisker_types::{CatalogEntry, Rarity};

    use super::*;
    use crate::memory::MemoryStore;
    use crate::testkit::{balance, entry, ok, rejected, store_with, t0};

    async fn one_cat(balance: i64) -> (MemoryStore, UserId, OwnershipRecord) {
        let cat: CatalogEntry = entry("Tabby", Rarity::Common, dec!(1), 60, 10);
        let (store, user) = store_with(balance, &[cat.clone()]).await;
        let rec = OwnershipRecord::acquire(user, &cat, t0());
        store.seed_ownership(rec.clone()).await;
        (store, user, rec)
    }

    #[tokio::test]
    async fn feeding_stamps_and_journals() {
        let (store, user, rec) = one_cat(0).await;
        let now = t0() + Duration::days(1);
        let outcome = ok(feed(&store, &EconomyConfig::default(), user, rec.id, now).await);
        assert_eq!(outcome.ownership.last_fed_at, Some(now));
        assert_eq!(outcome.charged, 0);
        let snapshot = store.snapshot().await;
        assert_eq!(snapshot.journal().entries_of(user, AuditAction::Care).len(), 1);
    }

    #[tokio::test]
    async fn play_revives_neglected_cat() {
        let (store, user, rec) = one_cat(0).await;
        let config = EconomyConfig::default();
        // Common play deadline is 2 days, feed deadline 3.
        let now = t0() + Duration::hours(60);
        let outcome = ok(play(&store, &config, user, rec.id, now).await);
        assert!(outcome.revived);
        assert_eq!(outcome.ownership.status, OwnershipStatus::Active);
        assert_eq!(outcome.ownership.last_played_at, Some(now));
    }

    #[tokio::test]
    async fn stored_neglect_is_reported_as_revived() {
        let (store, user, mut rec) = one_cat(0).await;
        rec.set_status(OwnershipStatus::Neglected, t0());
        store.seed_ownership(rec.clone()).await;
        let outcome = ok(play(&store, &EconomyConfig::default(), user, rec.id, t0()).await);
        assert!(outcome.revived);
    }

    #[tokio::test]
    async fn starved_cat_dies_and_rejects() {
        let (store, user, rec) = one_cat(0).await;
        let now = t0() + Duration::days(3);
        let rejection = rejected(feed(&store, &EconomyConfig::default(), user, rec.id, now).await);
        assert_eq!(rejection, Rejection::EntityDead);

        let snapshot = store.snapshot().await;
        let stored = snapshot.ownerships_of(user).first().map(|r| r.status);
        assert_eq!(stored, Some(OwnershipStatus::Dead));
        assert_eq!(snapshot.journal().entries_of(user, AuditAction::Decay).len(), 1);
        assert!(snapshot.journal().entries_of(user, AuditAction::Care).is_empty());
    }

    #[tokio::test]
    async fn foreign_cat_is_not_found() {
        let (store, _owner, rec) = one_cat(0).await;
        let stranger = UserId::new();
        let rejection = rejected(feed(&store, &EconomyConfig::default(), stranger, rec.id, t0()).await);
        assert_eq!(rejection, Rejection::NotFound { what: "ownership" });
    }

    #[tokio::test]
    async fn priced_care_charges_or_rejects() {
        let (store, user, rec) = one_cat(5).await;
        let mut config = EconomyConfig::default();
        config.care.feed_cost = 3;

        let outcome = ok(feed(&store, &config, user, rec.id, t0()).await);
        assert_eq!((outcome.charged, outcome.balance), (3, 2));

        let rejection = rejected(feed(&store, &config, user, rec.id, t0()).await);
        assert!(matches!(rejection, Rejection::InsufficientFunds { required: 3, available: 2 }));
        assert_eq!(balance(&store, user).await, 2);
    }
}
