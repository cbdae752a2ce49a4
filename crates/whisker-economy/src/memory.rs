//! In-memory [`EconomyStore`] for tests and single-process hosting.
//!
//! A transaction takes the store-wide async lock, works on a private copy
//! of the state, and writes the copy back on commit. Dropping the
//! transaction releases the lock and discards the copy, which is exactly
//! rollback. One writer at a time is stricter than per-user locking but
//! gives the same isolation guarantees.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use whisker_ledger::AuditJournal;
use whisker_types::{
    AuditEntry, CatalogEntry, CatalogEntryId, Companion, Item, ItemHolding, ItemId,
    OwnershipId, OwnershipRecord, UserAccount, UserId,
};

use crate::error::StoreError;
use crate::store::{BalanceUpdate, EconomyStore, StoreTx};

/// Everything the in-memory store holds.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    users: BTreeMap<UserId, UserAccount>,
    catalog: BTreeMap<CatalogEntryId, CatalogEntry>,
    items: BTreeMap<ItemId, Item>,
    ownerships: BTreeMap<OwnershipId, OwnershipRecord>,
    pity: BTreeMap<(UserId, String), u32>,
    holdings: BTreeMap<(UserId, ItemId), u32>,
    equipment: BTreeSet<(OwnershipId, ItemId)>,
    companions: BTreeMap<UserId, Companion>,
    journal: AuditJournal,
}

impl MemoryState {
    /// Account for `user`, if it exists.
    pub fn user(&self, user: UserId) -> Option<&UserAccount> {
        self.users.get(&user)
    }

    /// The record for `(user, entry)`, if any.
    pub fn ownership(&self, user: UserId, entry: CatalogEntryId) -> Option<&OwnershipRecord> {
        self.ownerships
            .values()
            .find(|r| r.user_id == user && r.entry_id == entry)
    }

    /// All records owned by `user`.
    pub fn ownerships_of(&self, user: UserId) -> Vec<&OwnershipRecord> {
        self.ownerships.values().filter(|r| r.user_id == user).collect()
    }

    /// Pity counter for `(user, pool)`.
    pub fn pity(&self, user: UserId, pool: &str) -> u32 {
        self.pity.get(&(user, pool.to_owned())).copied().unwrap_or(0)
    }

    /// Units of `item` held by `user`.
    pub fn holding(&self, user: UserId, item: ItemId) -> u32 {
        self.holdings.get(&(user, item)).copied().unwrap_or(0)
    }

    /// Items equipped on `ownership`.
    pub fn equipped_on(&self, ownership: OwnershipId) -> Vec<ItemId> {
        self.equipment
            .iter()
            .filter(|(o, _)| *o == ownership)
            .map(|(_, i)| *i)
            .collect()
    }

    /// The user's companion, if adopted.
    pub fn companion(&self, user: UserId) -> Option<&Companion> {
        self.companions.get(&user)
    }

    /// The audit journal.
    pub const fn journal(&self) -> &AuditJournal {
        &self.journal
    }

    fn user_mut(&mut self, user: UserId) -> Result<&mut UserAccount, StoreError> {
        self.users
            .get_mut(&user)
            .ok_or_else(|| StoreError::InvalidData(format!("user {user} is not locked")))
    }
}

/// Shared in-memory store. Cloning yields another handle to the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    fail_commit: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a catalog entry.
    pub async fn insert_catalog_entry(&self, entry: CatalogEntry) {
        self.state.lock().await.catalog.insert(entry.id, entry);
    }

    /// Add or replace an item.
    pub async fn insert_item(&self, item: Item) {
        self.state.lock().await.items.insert(item.id, item);
    }

    /// Add or replace an account.
    pub async fn seed_user(&self, account: UserAccount) {
        self.state.lock().await.users.insert(account.id, account);
    }

    /// Add or replace an ownership record directly, bypassing the rules.
    pub async fn seed_ownership(&self, record: OwnershipRecord) {
        self.state.lock().await.ownerships.insert(record.id, record);
    }

    /// A copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Make the next commit fail with a backend error.
    pub fn fail_next_commit(&self) {
        self.fail_commit.store(true, Ordering::SeqCst);
    }
}

impl EconomyStore for MemoryStore {
    type Tx = MemoryTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(MemoryTx {
            guard,
            working,
            fail_commit: Arc::clone(&self.fail_commit),
        })
    }
}

/// A transaction over [`MemoryStore`].
#[derive(Debug)]
pub struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
    fail_commit: Arc<AtomicBool>,
}

fn adjust(value: &mut i64, delta: i64) -> Result<BalanceUpdate, StoreError> {
    let next = value
        .checked_add(delta)
        .ok_or_else(|| StoreError::InvalidData("balance overflow".to_owned()))?;
    if next < 0 {
        return Ok(BalanceUpdate::Insufficient { balance: *value });
    }
    *value = next;
    Ok(BalanceUpdate::Applied(next))
}

impl StoreTx for MemoryTx {
    async fn lock_user(&mut self, user: UserId, now: DateTime<Utc>) -> Result<UserAccount, StoreError> {
        Ok(self
            .working
            .users
            .entry(user)
            .or_insert_with(|| UserAccount::new(user, now))
            .clone())
    }

    async fn adjust_balance(&mut self, user: UserId, delta: i64) -> Result<BalanceUpdate, StoreError> {
        adjust(&mut self.working.user_mut(user)?.balance, delta)
    }

    async fn adjust_essence(&mut self, user: UserId, delta: i64) -> Result<BalanceUpdate, StoreError> {
        adjust(&mut self.working.user_mut(user)?.essence, delta)
    }

    async fn set_last_accrual(&mut self, user: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.working.user_mut(user)?.last_accrual_at = Some(at);
        Ok(())
    }

    async fn set_tier(&mut self, user: UserId, tier: u32) -> Result<(), StoreError> {
        self.working.user_mut(user)?.tier = tier;
        Ok(())
    }

    async fn list_owner_ids(&mut self) -> Result<Vec<UserId>, StoreError> {
        let owners: BTreeSet<UserId> = self.working.ownerships.values().map(|r| r.user_id).collect();
        Ok(owners.into_iter().collect())
    }

    async fn get_catalog_entry(&mut self, id: CatalogEntryId) -> Result<Option<CatalogEntry>, StoreError> {
        Ok(self.working.catalog.get(&id).cloned())
    }

    async fn list_eligible_entries(
        &mut self,
        pool: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogEntry>, StoreError> {
        Ok(self
            .working
            .catalog
            .values()
            .filter(|e| e.is_eligible(pool, now))
            .cloned()
            .collect())
    }

    async fn get_ownership(
        &mut self,
        user: UserId,
        entry: CatalogEntryId,
    ) -> Result<Option<OwnershipRecord>, StoreError> {
        Ok(self.working.ownership(user, entry).cloned())
    }

    async fn get_ownership_by_id(&mut self, id: OwnershipId) -> Result<Option<OwnershipRecord>, StoreError> {
        Ok(self.working.ownerships.get(&id).cloned())
    }

    async fn list_owned_entries(
        &mut self,
        user: UserId,
    ) -> Result<Vec<(OwnershipRecord, CatalogEntry)>, StoreError> {
        let mut rows = Vec::new();
        for record in self.working.ownerships.values().filter(|r| r.user_id == user) {
            let entry = self.working.catalog.get(&record.entry_id).ok_or_else(|| {
                StoreError::InvalidData(format!("ownership {} references unknown entry", record.id))
            })?;
            rows.push((record.clone(), entry.clone()));
        }
        Ok(rows)
    }

    async fn upsert_ownership(&mut self, record: &OwnershipRecord) -> Result<(), StoreError> {
        let clash = self.working.ownerships.values().any(|r| {
            r.id != record.id && r.user_id == record.user_id && r.entry_id == record.entry_id
        });
        if clash {
            return Err(StoreError::InvalidData(format!(
                "user {} already owns entry {}",
                record.user_id, record.entry_id
            )));
        }
        self.working.ownerships.insert(record.id, record.clone());
        Ok(())
    }

    async fn delete_ownership(&mut self, id: OwnershipId) -> Result<(), StoreError> {
        self.working.ownerships.remove(&id);
        self.working.equipment.retain(|(o, _)| *o != id);
        Ok(())
    }

    async fn get_pity(&mut self, user: UserId, pool: &str) -> Result<u32, StoreError> {
        Ok(self.working.pity(user, pool))
    }

    async fn set_pity(&mut self, user: UserId, pool: &str, value: u32) -> Result<(), StoreError> {
        self.working.pity.insert((user, pool.to_owned()), value);
        Ok(())
    }

    async fn get_item(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.working.items.get(&id).cloned())
    }

    async fn list_holdings(&mut self, user: UserId) -> Result<Vec<ItemHolding>, StoreError> {
        let mut holdings = Vec::new();
        for ((owner, item_id), quantity) in &self.working.holdings {
            if *owner != user || *quantity == 0 {
                continue;
            }
            let item = self.working.items.get(item_id).ok_or_else(|| {
                StoreError::InvalidData(format!("holding references unknown item {item_id}"))
            })?;
            holdings.push(ItemHolding {
                item: item.clone(),
                quantity: *quantity,
            });
        }
        Ok(holdings)
    }

    async fn add_holding(&mut self, user: UserId, item: ItemId, quantity: u32) -> Result<u32, StoreError> {
        let held = self.working.holdings.entry((user, item)).or_insert(0);
        *held = held
            .checked_add(quantity)
            .ok_or_else(|| StoreError::InvalidData("holding quantity overflow".to_owned()))?;
        Ok(*held)
    }

    async fn list_equipment(&mut self, user: UserId) -> Result<Vec<(OwnershipId, Item)>, StoreError> {
        let mut pairs = Vec::new();
        for (ownership, item_id) in &self.working.equipment {
            let owned_by_user = self
                .working
                .ownerships
                .get(ownership)
                .is_some_and(|r| r.user_id == user);
            if !owned_by_user {
                continue;
            }
            if let Some(item) = self.working.items.get(item_id) {
                pairs.push((*ownership, item.clone()));
            }
        }
        Ok(pairs)
    }

    async fn equip(&mut self, ownership: OwnershipId, item: ItemId) -> Result<(), StoreError> {
        self.working.equipment.insert((ownership, item));
        Ok(())
    }

    async fn unequip(&mut self, ownership: OwnershipId, item: ItemId) -> Result<bool, StoreError> {
        Ok(self.working.equipment.remove(&(ownership, item)))
    }

    async fn get_companion(&mut self, user: UserId) -> Result<Option<Companion>, StoreError> {
        Ok(self.working.companions.get(&user).cloned())
    }

    async fn upsert_companion(&mut self, companion: &Companion) -> Result<(), StoreError> {
        self.working.companions.insert(companion.user_id, companion.clone());
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.working.journal.append(entry.clone());
        Ok(())
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        if self.fail_commit.swap(false, Ordering::SeqCst) {
            tracing::warn!("memory store commit failed on request");
            return Err(StoreError::Backend("injected commit failure".to_owned()));
        }
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }
}
