//! Duplicate absorption and leveling.
//!
//! Acquiring an entry the user already owns does not create a second
//! record. The duplicate advances the record's counter instead, and once
//! the counter reaches the rarity's threshold the record levels up and the
//! counter resets. Records at the max level turn duplicates into essence
//! (zero by default).
//!
//! # Status on acquisition
//!
//! - A `Neglected` record is revived to `Active` by any acquisition touch,
//!   and the touch counts as play time.
//! - A `Dead` record (or one whose feed deadline has already passed) is
//!   deleted and replaced by a fresh level-1 record.

use chrono::{DateTime, Utc};
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{
    AcquisitionKind, AuditAction, CatalogEntry, OwnershipId, OwnershipRecord, OwnershipStatus,
    UserId,
};

use crate::config::EconomyConfig;
use crate::error::{EconomyError, StoreError};
use crate::store::{BalanceUpdate, EconomyStore, StoreTx, record};
use crate::survival::evaluate_survival;

/// How an acquisition was absorbed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquisition {
    /// New record, duplicate, or duplicate at max level.
    pub kind: AcquisitionKind,
    /// The record that absorbed the acquisition.
    pub ownership_id: OwnershipId,
    /// Level after resolution.
    pub level: u32,
    /// Duplicate counter after resolution.
    pub dup_count: u32,
    /// Level-up threshold for the record's rarity; `None` for new records
    /// and duplicates at max level.
    pub threshold: Option<u32>,
    /// Whether this acquisition caused a level-up.
    pub leveled_up: bool,
    /// Whether a neglected record was revived.
    pub revived: bool,
    /// Whether a dead record was replaced.
    pub replaced_dead: bool,
    /// Essence credited for a duplicate at max level.
    pub essence: i64,
}

/// Resolve an acquisition of `entry` by `user` in its own transaction.
pub async fn resolve_acquisition<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    entry: &CatalogEntry,
    now: DateTime<Utc>,
) -> Result<Acquisition, EconomyError> {
    let mut tx = store.begin().await?;
    tx.lock_user(user, now).await?;
    let acquisition = resolve_in_tx(&mut tx, config, user, entry, now).await?;
    tx.commit().await?;
    Ok(acquisition)
}

/// Resolve an acquisition inside an open transaction.
pub async fn resolve_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &EconomyConfig,
    user: UserId,
    entry: &CatalogEntry,
    now: DateTime<Utc>,
) -> Result<Acquisition, EconomyError> {
    let mut current = match tx.get_ownership(user, entry.id).await? {
        None => return create_record(tx, user, entry, now, None).await,
        Some(existing) => existing,
    };

    let transition = evaluate_survival(&current, &config.survival, now);
    if transition.to == OwnershipStatus::Dead {
        tx.delete_ownership(current.id).await?;
        tracing::info!(
            user_id = %user,
            ownership_id = %current.id,
            "dead record replaced by new acquisition"
        );
        return create_record(tx, user, entry, now, Some(current.id)).await;
    }

    // Overdue records revive too, whether or not a sweep has marked them yet.
    let revived = current.status == OwnershipStatus::Neglected
        || transition.to == OwnershipStatus::Neglected;
    if revived {
        current.set_status(OwnershipStatus::Active, now);
        current.last_played_at = Some(now);
        tracing::info!(user_id = %user, ownership_id = %current.id, "neglected record revived");
    }

    if current.level >= config.leveling.max_level {
        return absorb_at_max(tx, config, user, current, revived, now).await;
    }

    let threshold = *config.leveling.thresholds.get(current.rarity);
    current.dup_count = current
        .dup_count
        .checked_add(1)
        .ok_or_else(|| EconomyError::overflow("duplicate counter"))?;

    let leveled_up = current.dup_count >= threshold;
    if leveled_up {
        current.level = current
            .level
            .checked_add(1)
            .ok_or_else(|| EconomyError::overflow("level"))?;
        current.dup_count = 0;
    }
    tx.upsert_ownership(&current).await?;

    record(
        tx,
        AuditEntryBuilder::new(user, AuditAction::Duplicate)
            .reference(current.id)
            .metadata(json!({
                "entry_id": entry.id,
                "dup_count": current.dup_count,
                "threshold": threshold,
            }))
            .at(now),
    )
    .await?;

    if leveled_up {
        record(
            tx,
            AuditEntryBuilder::new(user, AuditAction::LevelUp)
                .reference(current.id)
                .metadata(json!({ "entry_id": entry.id, "level": current.level }))
                .at(now),
        )
        .await?;
        tracing::info!(
            user_id = %user,
            ownership_id = %current.id,
            level = current.level,
            "record leveled up"
        );
    }

    Ok(Acquisition {
        kind: AcquisitionKind::Duplicate,
        ownership_id: current.id,
        level: current.level,
        dup_count: current.dup_count,
        threshold: Some(threshold),
        leveled_up,
        revived,
        replaced_dead: false,
        essence: 0,
    })
}

async fn create_record<T: StoreTx>(
    tx: &mut T,
    user: UserId,
    entry: &CatalogEntry,
    now: DateTime<Utc>,
    replaced: Option<OwnershipId>,
) -> Result<Acquisition, EconomyError> {
    let fresh = OwnershipRecord::acquire(user, entry, now);
    tx.upsert_ownership(&fresh).await?;
    record(
        tx,
        AuditEntryBuilder::new(user, AuditAction::Acquire)
            .reference(fresh.id)
            .metadata(json!({
                "entry_id": entry.id,
                "rarity": entry.rarity,
                "replaced": replaced,
            }))
            .at(now),
    )
    .await?;
    tracing::debug!(user_id = %user, entry_id = %entry.id, "new record created");

    Ok(Acquisition {
        kind: AcquisitionKind::New,
        ownership_id: fresh.id,
        level: fresh.level,
        dup_count: fresh.dup_count,
        threshold: None,
        leveled_up: false,
        revived: false,
        replaced_dead: replaced.is_some(),
        essence: 0,
    })
}

async fn absorb_at_max<T: StoreTx>(
    tx: &mut T,
    config: &EconomyConfig,
    user: UserId,
    current: OwnershipRecord,
    revived: bool,
    now: DateTime<Utc>,
) -> Result<Acquisition, EconomyError> {
    if revived {
        tx.upsert_ownership(&current).await?;
    }

    let essence = config.leveling.essence_per_max_duplicate;
    if essence > 0
        && let BalanceUpdate::Insufficient { balance } = tx.adjust_essence(user, essence).await?
    {
        return Err(StoreError::InvalidData(format!(
            "essence credit of {essence} refused at {balance}"
        ))
        .into());
    }

    record(
        tx,
        AuditEntryBuilder::new(user, AuditAction::DuplicateAtMax)
            .essence(essence)
            .reference(current.id)
            .metadata(json!({ "entry_id": current.entry_id, "level": current.level }))
            .at(now),
    )
    .await?;

    Ok(Acquisition {
        kind: AcquisitionKind::DuplicateAtMax,
        ownership_id: current.id,
        level: current.level,
        dup_count: current.dup_count,
        threshold: None,
        leveled_up: false,
        revived,
        replaced_dead: false,
        essence,
    })
}
