//! Enumeration types for the Whisker economy.
//!
//! All closed sets used by the data model: rarity tiers, ownership status,
//! audit actions and acquisition kinds. Each enum has a stable lowercase
//! string form used both in YAML configuration and in database columns.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing an enum from its string form fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    /// Name of the enum being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl core::fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown {} value: {:?}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

// ---------------------------------------------------------------------------
// Rarity
// ---------------------------------------------------------------------------

/// Rarity tier of a catalog entry.
///
/// Ordering is meaningful: `Common < Rare < Epic < Legendary < Mythic <
/// Divine`. Pity thresholds compare with `>=` on this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    /// The bulk of every pool.
    Common,
    /// Uncommon pulls.
    Rare,
    /// The default pity-qualifying tier.
    Epic,
    /// Very rare pulls.
    Legendary,
    /// The rarest drawable tier.
    Mythic,
    /// Admin-grant only. Never appears in draw or purchase pools.
    Divine,
}

impl Rarity {
    /// Every rarity in ascending order.
    pub const ALL: [Self; 6] = [
        Self::Common,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
        Self::Mythic,
        Self::Divine,
    ];

    /// Whether entries of this rarity may appear in draw and purchase pools.
    pub const fn is_drawable(self) -> bool {
        !matches!(self, Self::Divine)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
            Self::Mythic => "mythic",
            Self::Divine => "divine",
        }
    }
}

impl core::fmt::Display for Rarity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "rarity",
                value: s.to_owned(),
            })
    }
}

// ---------------------------------------------------------------------------
// Ownership status
// ---------------------------------------------------------------------------

/// Lifecycle status of an owned cat.
///
/// `Dead` is terminal: nothing transitions out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipStatus {
    /// Cared for; contributes to production.
    Active,
    /// Play deadline missed; the cat has run away but can still be won back.
    Neglected,
    /// Feed deadline missed.
    Dead,
}

impl OwnershipStatus {
    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Neglected => "neglected",
            Self::Dead => "dead",
        }
    }

    /// Whether the status is terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Dead)
    }
}

impl core::fmt::Display for OwnershipStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OwnershipStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "neglected" => Ok(Self::Neglected),
            "dead" => Ok(Self::Dead),
            other => Err(UnknownVariant {
                kind: "ownership status",
                value: other.to_owned(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Acquisition kind
// ---------------------------------------------------------------------------

/// How an acquisition was absorbed into the user's collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionKind {
    /// A brand-new ownership record was created.
    New,
    /// The acquisition advanced the duplicate counter (and maybe the level).
    Duplicate,
    /// The record was already at max level; the duplicate had no level effect.
    DuplicateAtMax,
}

// ---------------------------------------------------------------------------
// Audit actions
// ---------------------------------------------------------------------------

/// Category of an audit log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Passive income credited by an accrual claim.
    Accrual,
    /// A gacha draw (currency debit).
    Draw,
    /// A direct catalog purchase (currency debit).
    Purchase,
    /// A new ownership record was created.
    Acquire,
    /// A duplicate was absorbed into level progress.
    Duplicate,
    /// A duplicate arrived for a record at max level.
    DuplicateAtMax,
    /// A level-up happened.
    LevelUp,
    /// Feed or play interaction.
    Care,
    /// An ownership record changed status through decay.
    Decay,
    /// An ownership record was permanently removed by cleanup.
    Released,
    /// Item granted to a user.
    ItemGrant,
    /// Item equipped or unequipped.
    Equip,
    /// Account tier upgrade.
    TierUpgrade,
    /// Entry granted by an operator outside the draw/purchase paths.
    Grant,
}

impl AuditAction {
    /// Stable snake-case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accrual => "accrual",
            Self::Draw => "draw",
            Self::Purchase => "purchase",
            Self::Acquire => "acquire",
            Self::Duplicate => "duplicate",
            Self::DuplicateAtMax => "duplicate_at_max",
            Self::LevelUp => "level_up",
            Self::Care => "care",
            Self::Decay => "decay",
            Self::Released => "released",
            Self::ItemGrant => "item_grant",
            Self::Equip => "equip",
            Self::TierUpgrade => "tier_upgrade",
            Self::Grant => "grant",
        }
    }

    /// Whether entries of this action are expected to move currency.
    pub const fn moves_currency(self) -> bool {
        matches!(
            self,
            Self::Accrual | Self::Draw | Self::Purchase | Self::Care | Self::TierUpgrade
        )
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        const ALL: [AuditAction; 14] = [
            AuditAction::Accrual,
            AuditAction::Draw,
            AuditAction::Purchase,
            AuditAction::Acquire,
            AuditAction::Duplicate,
            AuditAction::DuplicateAtMax,
            AuditAction::LevelUp,
            AuditAction::Care,
            AuditAction::Decay,
            AuditAction::Released,
            AuditAction::ItemGrant,
            AuditAction::Equip,
            AuditAction::TierUpgrade,
            AuditAction::Grant,
        ];
        ALL.into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "audit action",
                value: s.to_owned(),
            })
    }
}
