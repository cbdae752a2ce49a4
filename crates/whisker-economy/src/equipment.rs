//! Item grants and equipment slots.
//!
//! Items are held per user with a quantity. Equipping attaches one held
//! unit to one cat: the same item cannot sit twice on the same cat, and a
//! user can never have more copies of an item equipped than they hold.
//! Each cat has `slot_capacity(tier)` slots.

use chrono::{DateTime, Utc};
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, ItemId, OwnershipId, OwnershipStatus, UserId};

use crate::config::EquipmentConfig;
use crate::outcome::{Outcome, Rejection};
use crate::store::{EconomyStore, StoreTx, record};

/// Equipment slots per cat for an account tier.
pub fn slot_capacity(tier: u32, config: &EquipmentConfig) -> u32 {
    let extra = tier
        .saturating_sub(1)
        .checked_div(config.tiers_per_slot)
        .unwrap_or(0);
    config.base_slots.saturating_add(extra).min(config.max_slots)
}

/// Give `quantity` units of an item to a user. Returns the new quantity.
pub async fn grant_item<S: EconomyStore>(
    store: &S,
    user: UserId,
    item: ItemId,
    quantity: u32,
    now: DateTime<Utc>,
) -> Outcome<u32> {
    if quantity == 0 {
        return Ok(Err(Rejection::invalid("quantity must be at least 1")));
    }
    let mut tx = store.begin().await?;
    tx.lock_user(user, now).await?;
    if tx.get_item(item).await?.is_none() {
        return Ok(Err(Rejection::NotFound { what: "item" }));
    }
    let held = tx.add_holding(user, item, quantity).await?;
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::ItemGrant)
            .reference(item)
            .metadata(json!({ "quantity": quantity, "held": held }))
            .at(now),
    )
    .await?;
    tx.commit().await?;

    tracing::debug!(user_id = %user, item_id = %item, quantity, held, "item granted");
    Ok(Ok(held))
}

/// Attach a held item to one of the user's cats.
pub async fn equip<S: EconomyStore>(
    store: &S,
    config: &EquipmentConfig,
    user: UserId,
    ownership: OwnershipId,
    item: ItemId,
    now: DateTime<Utc>,
) -> Outcome<()> {
    let mut tx = store.begin().await?;
    match equip_in_tx(&mut tx, config, user, ownership, item, now).await? {
        Ok(()) => {}
        Err(rejection) => return Ok(Err(rejection)),
    }
    tx.commit().await?;
    tracing::debug!(user_id = %user, ownership_id = %ownership, item_id = %item, "item equipped");
    Ok(Ok(()))
}

async fn equip_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &EquipmentConfig,
    user: UserId,
    ownership: OwnershipId,
    item: ItemId,
    now: DateTime<Utc>,
) -> Outcome<()> {
    let account = tx.lock_user(user, now).await?;
    let target = match tx.get_ownership_by_id(ownership).await? {
        Some(r) if r.user_id == user => r,
        _ => return Ok(Err(Rejection::NotFound { what: "ownership" })),
    };
    if target.status == OwnershipStatus::Dead {
        return Ok(Err(Rejection::EntityDead));
    }
    if tx.get_item(item).await?.is_none() {
        return Ok(Err(Rejection::NotFound { what: "item" }));
    }

    let equipment = tx.list_equipment(user).await?;
    if equipment.iter().any(|(o, i)| *o == ownership && i.id == item) {
        return Ok(Err(Rejection::AlreadyEquipped));
    }

    let capacity = slot_capacity(account.tier, config);
    let used = equipment.iter().filter(|(o, _)| *o == ownership).count();
    if used >= usize::try_from(capacity).unwrap_or(usize::MAX) {
        return Ok(Err(Rejection::SlotsFull { capacity }));
    }

    let held = tx
        .list_holdings(user)
        .await?
        .into_iter()
        .find(|h| h.item.id == item)
        .map_or(0, |h| h.quantity);
    let in_use = equipment.iter().filter(|(_, i)| i.id == item).count();
    if usize::try_from(held).unwrap_or(usize::MAX) <= in_use {
        return Ok(Err(Rejection::ItemNotHeld));
    }

    tx.equip(ownership, item).await?;
    record(
        tx,
        AuditEntryBuilder::new(user, AuditAction::Equip)
            .reference(ownership)
            .metadata(json!({ "item_id": item, "equipped": true }))
            .at(now),
    )
    .await?;
    Ok(Ok(()))
}

/// Detach an item from one of the user's cats.
pub async fn unequip<S: EconomyStore>(
    store: &S,
    user: UserId,
    ownership: OwnershipId,
    item: ItemId,
    now: DateTime<Utc>,
) -> Outcome<()> {
    let mut tx = store.begin().await?;
    tx.lock_user(user, now).await?;
    match tx.get_ownership_by_id(ownership).await? {
        Some(r) if r.user_id == user => {}
        _ => return Ok(Err(Rejection::NotFound { what: "ownership" })),
    }
    if !tx.unequip(ownership, item).await? {
        return Ok(Err(Rejection::NotEquipped));
    }
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::Equip)
            .reference(ownership)
            .metadata(json!({ "item_id": item, "equipped": false }))
            .at(now),
    )
    .await?;
    tx.commit().await?;
    Ok(Ok(()))
}
