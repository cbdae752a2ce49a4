//! The storage boundary consumed by the economy.
//!
//! Every operation opens one transaction with [`EconomyStore::begin`],
//! locks the acting user's row first, performs its reads and writes
//! through [`StoreTx`], and finishes with [`StoreTx::commit`]. Dropping a
//! transaction without committing rolls back everything it wrote, so an
//! operation that returns early (rejection, error, cancellation) leaves no
//! partial state behind.
//!
//! Two implementations exist: [`MemoryStore`](crate::memory::MemoryStore)
//! in this crate and the `PostgreSQL` store in `whisker-db`.

use std::future::Future;

use chrono::{DateTime, Utc};

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{
    AuditEntry, CatalogEntry, CatalogEntryId, Companion, Item, ItemHolding, ItemId,
    OwnershipId, OwnershipRecord, UserAccount, UserId,
};

use crate::error::{EconomyError, StoreError};
use crate::outcome::Rejection;

/// Result of an atomic balance adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceUpdate {
    /// The delta was applied; carries the new balance.
    Applied(i64),
    /// The delta would have made the balance negative. Nothing changed.
    Insufficient {
        /// The unchanged balance.
        balance: i64,
    },
}

/// A handle that can open economy transactions.
pub trait EconomyStore: Send + Sync {
    /// The transaction type produced by [`EconomyStore::begin`].
    type Tx: StoreTx;

    /// Open a new transaction.
    fn begin(&self) -> impl Future<Output = Result<Self::Tx, StoreError>> + Send;
}

/// One open transaction against the economy's state.
///
/// All reads observe the transaction's own writes. Nothing is visible to
/// other transactions until [`StoreTx::commit`] succeeds.
pub trait StoreTx: Send {
    // -- Accounts ----------------------------------------------------------

    /// Create the account if missing, then lock it for the rest of the
    /// transaction and return it.
    fn lock_user(
        &mut self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<UserAccount, StoreError>> + Send;

    /// Atomically add `delta` to the currency balance, refusing to go
    /// below zero.
    fn adjust_balance(
        &mut self,
        user: UserId,
        delta: i64,
    ) -> impl Future<Output = Result<BalanceUpdate, StoreError>> + Send;

    /// Atomically add `delta` to the essence balance, refusing to go below
    /// zero.
    fn adjust_essence(
        &mut self,
        user: UserId,
        delta: i64,
    ) -> impl Future<Output = Result<BalanceUpdate, StoreError>> + Send;

    /// Store the instant up to which passive income has been paid.
    fn set_last_accrual(
        &mut self,
        user: UserId,
        at: DateTime<Utc>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Store a new account tier.
    fn set_tier(
        &mut self,
        user: UserId,
        tier: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Every user that owns at least one cat.
    fn list_owner_ids(&mut self) -> impl Future<Output = Result<Vec<UserId>, StoreError>> + Send;

    // -- Catalog -----------------------------------------------------------

    /// Look up a catalog entry regardless of availability.
    fn get_catalog_entry(
        &mut self,
        id: CatalogEntryId,
    ) -> impl Future<Output = Result<Option<CatalogEntry>, StoreError>> + Send;

    /// Entries that are active, drawable, inside their window at `now` and
    /// members of `pool`.
    fn list_eligible_entries(
        &mut self,
        pool: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<CatalogEntry>, StoreError>> + Send;

    // -- Ownership ---------------------------------------------------------

    /// The record for `(user, entry)`, if any.
    fn get_ownership(
        &mut self,
        user: UserId,
        entry: CatalogEntryId,
    ) -> impl Future<Output = Result<Option<OwnershipRecord>, StoreError>> + Send;

    /// Look up a record by id.
    fn get_ownership_by_id(
        &mut self,
        id: OwnershipId,
    ) -> impl Future<Output = Result<Option<OwnershipRecord>, StoreError>> + Send;

    /// Every record owned by `user`, joined with its catalog entry.
    fn list_owned_entries(
        &mut self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<(OwnershipRecord, CatalogEntry)>, StoreError>> + Send;

    /// Insert or replace a record (keyed by its id).
    fn upsert_ownership(
        &mut self,
        record: &OwnershipRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Hard-delete a record together with its equipment.
    fn delete_ownership(
        &mut self,
        id: OwnershipId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- Pity --------------------------------------------------------------

    /// Current pity counter for `(user, pool)`, zero when never drawn.
    fn get_pity(
        &mut self,
        user: UserId,
        pool: &str,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Store the pity counter for `(user, pool)`.
    fn set_pity(
        &mut self,
        user: UserId,
        pool: &str,
        value: u32,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- Items and equipment -----------------------------------------------

    /// Look up an item.
    fn get_item(
        &mut self,
        id: ItemId,
    ) -> impl Future<Output = Result<Option<Item>, StoreError>> + Send;

    /// Items held by `user` with a positive quantity.
    fn list_holdings(
        &mut self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<ItemHolding>, StoreError>> + Send;

    /// Add units of an item to the user's holding; returns the new quantity.
    fn add_holding(
        &mut self,
        user: UserId,
        item: ItemId,
        quantity: u32,
    ) -> impl Future<Output = Result<u32, StoreError>> + Send;

    /// Every `(ownership, item)` equipment pair on the user's cats.
    fn list_equipment(
        &mut self,
        user: UserId,
    ) -> impl Future<Output = Result<Vec<(OwnershipId, Item)>, StoreError>> + Send;

    /// Attach an item to a cat.
    fn equip(
        &mut self,
        ownership: OwnershipId,
        item: ItemId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Detach an item from a cat; `false` when it was not attached.
    fn unequip(
        &mut self,
        ownership: OwnershipId,
        item: ItemId,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    // -- Companion ---------------------------------------------------------

    /// The user's companion, if adopted.
    fn get_companion(
        &mut self,
        user: UserId,
    ) -> impl Future<Output = Result<Option<Companion>, StoreError>> + Send;

    /// Insert or replace the user's companion.
    fn upsert_companion(
        &mut self,
        companion: &Companion,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    // -- Audit -------------------------------------------------------------

    /// Append an entry to the audit log.
    fn append_audit(
        &mut self,
        entry: &AuditEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Make every write in this transaction durable.
    fn commit(self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// Shared transaction steps
// ---------------------------------------------------------------------------

/// Validate an audit entry and append it inside `tx`.
pub(crate) async fn record<T: StoreTx>(
    tx: &mut T,
    builder: AuditEntryBuilder,
) -> Result<(), EconomyError> {
    let entry = builder.build()?;
    tx.append_audit(&entry).await?;
    Ok(())
}

/// Take `price` from the user's balance; returns the new balance.
///
/// A price of zero succeeds without touching the balance.
pub(crate) async fn debit<T: StoreTx>(
    tx: &mut T,
    user: UserId,
    price: i64,
    balance: i64,
) -> Result<Result<i64, Rejection>, EconomyError> {
    if price < 0 {
        return Ok(Err(Rejection::invalid("price must not be negative")));
    }
    if price == 0 {
        return Ok(Ok(balance));
    }
    let delta = price
        .checked_neg()
        .ok_or_else(|| EconomyError::overflow("price negation"))?;
    match tx.adjust_balance(user, delta).await? {
        BalanceUpdate::Applied(new_balance) => Ok(Ok(new_balance)),
        BalanceUpdate::Insufficient { balance } => {
            tracing::debug!(user_id = %user, price, balance, "debit refused");
            Ok(Err(Rejection::InsufficientFunds {
                required: price,
                available: balance,
            }))
        }
    }
}
