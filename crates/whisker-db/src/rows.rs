//! Row shapes returned by the economy queries and their conversion into
//! typed records.
//!
//! Postgres has no unsigned integers, so counters come back as `INTEGER`
//! or `SMALLINT` and are range-checked here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use uuid::Uuid;

use whisker_economy::StoreError;
use whisker_types::{
    CatalogEntry, Companion, Item, ItemEffect, ItemHolding, OwnershipId, OwnershipRecord,
    OwnershipStatus, Rarity, UserAccount,
};

use crate::error::invalid;

fn unsigned(what: &str, value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|e| invalid(what, e))
}

fn stat(what: &str, value: i16) -> Result<u8, StoreError> {
    u8::try_from(value).map_err(|e| invalid(what, e))
}

/// A row from the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct UserRow {
    pub id: Uuid,
    pub balance: i64,
    pub essence: i64,
    pub last_accrual_at: Option<DateTime<Utc>>,
    pub tier: i32,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserAccount {
    type Error = StoreError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            balance: row.balance,
            essence: row.essence,
            last_accrual_at: row.last_accrual_at,
            tier: unsigned("users.tier", row.tier)?,
            created_at: row.created_at,
        })
    }
}

/// A row from the `catalog_entries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CatalogRow {
    pub id: Uuid,
    pub name: String,
    pub rarity: String,
    pub rate_amount: Decimal,
    pub rate_interval_secs: i64,
    pub price: i64,
    pub active: bool,
    pub available_from: Option<DateTime<Utc>>,
    pub available_until: Option<DateTime<Utc>>,
    pub pools: Vec<String>,
}

impl TryFrom<CatalogRow> for CatalogEntry {
    type Error = StoreError;

    fn try_from(row: CatalogRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            name: row.name,
            rarity: row
                .rarity
                .parse::<Rarity>()
                .map_err(|e| invalid("catalog_entries.rarity", e))?,
            rate_amount: row.rate_amount,
            rate_interval_secs: row.rate_interval_secs,
            price: row.price,
            active: row.active,
            available_from: row.available_from,
            available_until: row.available_until,
            pools: row.pools.into_iter().collect(),
        })
    }
}

/// A row from the `ownerships` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct OwnershipRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub entry_id: Uuid,
    pub rarity: String,
    pub level: i32,
    pub dup_count: i32,
    pub status: String,
    pub status_since: DateTime<Utc>,
    pub last_fed_at: Option<DateTime<Utc>>,
    pub last_played_at: Option<DateTime<Utc>>,
    pub obtained_at: DateTime<Utc>,
}

impl TryFrom<OwnershipRow> for OwnershipRecord {
    type Error = StoreError;

    fn try_from(row: OwnershipRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id.into(),
            user_id: row.user_id.into(),
            entry_id: row.entry_id.into(),
            rarity: row
                .rarity
                .parse::<Rarity>()
                .map_err(|e| invalid("ownerships.rarity", e))?,
            level: unsigned("ownerships.level", row.level)?,
            dup_count: unsigned("ownerships.dup_count", row.dup_count)?,
            status: row
                .status
                .parse::<OwnershipStatus>()
                .map_err(|e| invalid("ownerships.status", e))?,
            status_since: row.status_since,
            last_fed_at: row.last_fed_at,
            last_played_at: row.last_played_at,
            obtained_at: row.obtained_at,
        })
    }
}

/// A row from the `items` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct ItemRow {
    pub id: Uuid,
    pub name: String,
    pub effect: Json<ItemEffect>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Self {
            id: row.id.into(),
            name: row.name,
            effect: row.effect.0,
        }
    }
}

/// An item joined with the quantity a user holds.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct HoldingRow {
    #[sqlx(flatten)]
    pub item: ItemRow,
    pub quantity: i32,
}

impl TryFrom<HoldingRow> for ItemHolding {
    type Error = StoreError;

    fn try_from(row: HoldingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            quantity: unsigned("holdings.quantity", row.quantity)?,
            item: row.item.into(),
        })
    }
}

/// An item joined with the ownership it is equipped on.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct EquipmentRow {
    pub ownership_id: Uuid,
    #[sqlx(flatten)]
    pub item: ItemRow,
}

impl From<EquipmentRow> for (OwnershipId, Item) {
    fn from(row: EquipmentRow) -> Self {
        (row.ownership_id.into(), row.item.into())
    }
}

/// A row from the `companions` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct CompanionRow {
    pub user_id: Uuid,
    pub satiety: i16,
    pub happiness: i16,
    pub alive: bool,
    pub last_tick_at: DateTime<Utc>,
}

impl TryFrom<CompanionRow> for Companion {
    type Error = StoreError;

    fn try_from(row: CompanionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.user_id.into(),
            satiety: stat("companions.satiety", row.satiety)?,
            happiness: stat("companions.happiness", row.happiness)?,
            alive: row.alive,
            last_tick_at: row.last_tick_at,
        })
    }
}
