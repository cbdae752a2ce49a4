//! Core record structs for the Whisker economy.
//!
//! One canonical struct per persisted entity: accounts, catalog entries,
//! ownership records, items, holdings, companions and audit entries.
//! Stores convert their rows into these types at the boundary so nothing
//! downstream ever handles loosely-shaped rows.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{AuditAction, OwnershipStatus, Rarity};
use crate::ids::{AuditEntryId, CatalogEntryId, ItemId, OwnershipId, UserId};

// ---------------------------------------------------------------------------
// User account
// ---------------------------------------------------------------------------

/// A user's economic state.
///
/// Balances are signed integers at the storage boundary but the ledger
/// contract keeps them non-negative at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    /// Account identifier.
    pub id: UserId,
    /// Primary currency balance.
    pub balance: i64,
    /// Secondary resource ("essence") earned from duplicates at max level.
    pub essence: i64,
    /// Instant up to which passive income has been paid out.
    pub last_accrual_at: Option<DateTime<Utc>>,
    /// Account tier (shelter level), at least 1.
    pub tier: u32,
    /// First time the account was seen.
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// A freshly created account with nothing in it.
    pub const fn new(id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            balance: 0,
            essence: 0,
            last_accrual_at: None,
            tier: 1,
            created_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog entry
// ---------------------------------------------------------------------------

/// A cat template that can be drawn, purchased or granted.
///
/// Production is expressed as `rate_amount` per `rate_interval_secs` and
/// normalized to a per-second rate by [`CatalogEntry::base_rate_per_second`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Entry identifier.
    pub id: CatalogEntryId,
    /// Display name.
    pub name: String,
    /// Rarity tier.
    pub rarity: Rarity,
    /// Currency produced per interval.
    pub rate_amount: Decimal,
    /// Production interval in seconds.
    pub rate_interval_secs: i64,
    /// Direct purchase price.
    pub price: i64,
    /// Admin-controlled availability switch.
    pub active: bool,
    /// Start of the availability window (inclusive).
    pub available_from: Option<DateTime<Utc>>,
    /// End of the availability window (exclusive).
    pub available_until: Option<DateTime<Utc>>,
    /// Named draw pools this entry belongs to.
    pub pools: BTreeSet<String>,
}

impl CatalogEntry {
    /// Per-second production rate.
    ///
    /// Zero when the interval is not positive.
    pub fn base_rate_per_second(&self) -> Decimal {
        rate_per_second(self.rate_amount, self.rate_interval_secs)
    }

    /// Whether the entry is inside its availability window at `now`.
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.available_from.is_none_or(|from| from <= now);
        let not_ended = self.available_until.is_none_or(|until| now < until);
        started && not_ended
    }

    /// Whether the entry may be sold or drawn at `now`, ignoring pools.
    pub fn is_obtainable_at(&self, now: DateTime<Utc>) -> bool {
        self.active && self.rarity.is_drawable() && self.is_available_at(now)
    }

    /// Whether the entry is eligible for `pool` at `now`.
    pub fn is_eligible(&self, pool: &str, now: DateTime<Utc>) -> bool {
        self.is_obtainable_at(now) && self.pools.contains(pool)
    }
}

/// Normalize `amount` per `interval_secs` into an amount per second.
///
/// Returns zero for non-positive intervals and negative amounts.
pub fn rate_per_second(amount: Decimal, interval_secs: i64) -> Decimal {
    if interval_secs <= 0 || amount.is_sign_negative() {
        return Decimal::ZERO;
    }
    amount
        .checked_div(Decimal::from(interval_secs))
        .unwrap_or(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Ownership record
// ---------------------------------------------------------------------------

/// One cat owned by one user. Unique per `(user_id, entry_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnershipRecord {
    /// Record identifier.
    pub id: OwnershipId,
    /// Owner.
    pub user_id: UserId,
    /// The catalog entry this record instantiates.
    pub entry_id: CatalogEntryId,
    /// Rarity copied from the entry at acquisition.
    pub rarity: Rarity,
    /// Current level, at least 1.
    pub level: u32,
    /// Duplicates absorbed since the last level-up.
    pub dup_count: u32,
    /// Lifecycle status.
    pub status: OwnershipStatus,
    /// When `status` last changed.
    pub status_since: DateTime<Utc>,
    /// Last feed interaction.
    pub last_fed_at: Option<DateTime<Utc>>,
    /// Last play interaction.
    pub last_played_at: Option<DateTime<Utc>>,
    /// First acquisition.
    pub obtained_at: DateTime<Utc>,
}

impl OwnershipRecord {
    /// A new level-1 record with every care timestamp set to `now`.
    pub fn acquire(user_id: UserId, entry: &CatalogEntry, now: DateTime<Utc>) -> Self {
        Self {
            id: OwnershipId::new(),
            user_id,
            entry_id: entry.id,
            rarity: entry.rarity,
            level: 1,
            dup_count: 0,
            status: OwnershipStatus::Active,
            status_since: now,
            last_fed_at: Some(now),
            last_played_at: Some(now),
            obtained_at: now,
        }
    }

    /// Change status, stamping `status_since` when it actually changes.
    pub fn set_status(&mut self, status: OwnershipStatus, now: DateTime<Utc>) {
        if self.status != status {
            self.status = status;
            self.status_since = now;
        }
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// Effect carried by an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ItemEffect {
    /// Adds a per-second amount to the user's total rate, per unit held.
    Flat(Decimal),
    /// Multiplies the user's total rate, once per unit held.
    Multiplier(Decimal),
    /// Shortens the production interval of the cat it is equipped on.
    IntervalReduction(i64),
}

impl ItemEffect {
    /// Stable snake-case name of the effect kind.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Flat(_) => "flat",
            Self::Multiplier(_) => "multiplier",
            Self::IntervalReduction(_) => "interval_reduction",
        }
    }
}

/// An effect-bearing item in the item catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Item identifier.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// What the item does.
    pub effect: ItemEffect,
}

/// An item together with how many units a user holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemHolding {
    /// The held item.
    pub item: Item,
    /// Units held.
    pub quantity: u32,
}

// ---------------------------------------------------------------------------
// Companion (stat-decay entity)
// ---------------------------------------------------------------------------

/// The single home pet tracked with numeric stats instead of deadlines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Companion {
    /// Owner.
    pub user_id: UserId,
    /// Fullness, 0 (starving) to 100.
    pub satiety: u8,
    /// Mood, 0 to 100.
    pub happiness: u8,
    /// Whether the companion is alive.
    pub alive: bool,
    /// Instant up to which decay has been applied.
    pub last_tick_at: DateTime<Utc>,
}

impl Companion {
    /// A healthy companion adopted at `now`.
    pub const fn adopt(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            satiety: 100,
            happiness: 100,
            alive: true,
            last_tick_at: now,
        }
    }
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

/// An append-only audit record.
///
/// `amount` and `essence` are signed deltas applied to the user's balances
/// by the same transaction that wrote the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry identifier.
    pub id: AuditEntryId,
    /// The affected user.
    pub user_id: UserId,
    /// What happened.
    pub action: AuditAction,
    /// Signed currency delta.
    pub amount: i64,
    /// Signed essence delta.
    pub essence: i64,
    /// Related record (ownership, catalog entry or item id).
    pub reference_id: Option<Uuid>,
    /// Free-form details.
    pub metadata: serde_json::Value,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}
