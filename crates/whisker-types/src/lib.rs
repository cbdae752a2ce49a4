//! Shared type definitions for the Whisker pet economy.
//!
//! This crate is the single source of truth for the records exchanged
//! between the economy core, the ledger and the storage layer.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all record identifiers
//! - [`enums`] -- Rarity, ownership status, audit actions, acquisition kinds
//! - [`structs`] -- Accounts, catalog entries, ownership records, items, audit entries

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{AcquisitionKind, AuditAction, OwnershipStatus, Rarity, UnknownVariant};
pub use ids::{AuditEntryId, CatalogEntryId, ItemId, OwnershipId, UserId};
pub use structs::{
    AuditEntry, CatalogEntry, Companion, Item, ItemEffect, ItemHolding, OwnershipRecord,
    UserAccount, rate_per_second,
};
