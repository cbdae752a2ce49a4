//! [`EconomyStore`] over `PostgreSQL`.
//!
//! Each economy transaction is one database transaction. `lock_user`
//! upserts the account row and takes a `FOR UPDATE` lock on it, so two
//! operations for the same user serialize while different users proceed in
//! parallel. Dropping a [`PgTx`] without committing rolls it back.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use whisker_economy::{BalanceUpdate, EconomyStore, StoreError, StoreTx};
use whisker_types::{
    AuditEntry, CatalogEntry, CatalogEntryId, Companion, Item, ItemHolding, ItemId, OwnershipId,
    OwnershipRecord, UserAccount, UserId,
};

use crate::error::{DbError, backend, invalid};
use crate::rows::{
    CatalogRow, CompanionRow, EquipmentRow, HoldingRow, ItemRow, OwnershipRow, UserRow,
};

fn signed(what: &str, value: u32) -> Result<i32, StoreError> {
    i32::try_from(value).map_err(|e| invalid(what, e))
}

/// Economy store handle over a `PostgreSQL` pool. Cheap to clone.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or replace a catalog entry.
    pub async fn upsert_catalog_entry(&self, entry: &CatalogEntry) -> Result<(), DbError> {
        let pools: Vec<&str> = entry.pools.iter().map(String::as_str).collect();
        sqlx::query(
            r"INSERT INTO catalog_entries (id, name, rarity, rate_amount, rate_interval_secs, price, active, available_from, available_until, pools)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
              ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                rarity = EXCLUDED.rarity,
                rate_amount = EXCLUDED.rate_amount,
                rate_interval_secs = EXCLUDED.rate_interval_secs,
                price = EXCLUDED.price,
                active = EXCLUDED.active,
                available_from = EXCLUDED.available_from,
                available_until = EXCLUDED.available_until,
                pools = EXCLUDED.pools",
        )
        .bind(entry.id.into_inner())
        .bind(&entry.name)
        .bind(entry.rarity.as_str())
        .bind(entry.rate_amount)
        .bind(entry.rate_interval_secs)
        .bind(entry.price)
        .bind(entry.active)
        .bind(entry.available_from)
        .bind(entry.available_until)
        .bind(&pools)
        .execute(&self.pool)
        .await?;

        tracing::debug!(entry_id = %entry.id, name = %entry.name, "catalog entry stored");
        Ok(())
    }

    /// Insert or replace an item.
    pub async fn upsert_item(&self, item: &Item) -> Result<(), DbError> {
        sqlx::query(
            r"INSERT INTO items (id, name, effect) VALUES ($1, $2, $3)
              ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, effect = EXCLUDED.effect",
        )
        .bind(item.id.into_inner())
        .bind(&item.name)
        .bind(Json(item.effect))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Every audit entry written for `user`, oldest first.
    pub async fn audit_entries(&self, user: UserId) -> Result<Vec<AuditRow>, DbError> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r"SELECT id, user_id, action, amount, essence, reference_id, metadata, created_at
              FROM audit_log
              WHERE user_id = $1
              ORDER BY created_at, id",
        )
        .bind(user.into_inner())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}

/// A row from the `audit_log` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuditRow {
    /// Entry UUID.
    pub id: Uuid,
    /// The affected user.
    pub user_id: Uuid,
    /// Action name.
    pub action: String,
    /// Signed currency delta.
    pub amount: i64,
    /// Signed essence delta.
    pub essence: i64,
    /// Related record.
    pub reference_id: Option<Uuid>,
    /// Free-form details.
    pub metadata: serde_json::Value,
    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl EconomyStore for PgStore {
    type Tx = PgTx;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await.map_err(backend)?;
        Ok(PgTx { tx })
    }
}

/// An open economy transaction on `PostgreSQL`.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

impl PgTx {
    async fn adjust(&mut self, user: UserId, delta: i64, essence: bool) -> Result<BalanceUpdate, StoreError> {
        let update = if essence {
            r"UPDATE users SET essence = essence + $2 WHERE id = $1 AND essence + $2 >= 0 RETURNING essence"
        } else {
            r"UPDATE users SET balance = balance + $2 WHERE id = $1 AND balance + $2 >= 0 RETURNING balance"
        };
        let applied: Option<i64> = sqlx::query_scalar(update)
            .bind(user.into_inner())
            .bind(delta)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(backend)?;
        if let Some(next) = applied {
            return Ok(BalanceUpdate::Applied(next));
        }

        let current = if essence {
            r"SELECT essence FROM users WHERE id = $1"
        } else {
            r"SELECT balance FROM users WHERE id = $1"
        };
        let balance: i64 = sqlx::query_scalar(current)
            .bind(user.into_inner())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(BalanceUpdate::Insufficient { balance })
    }

    async fn fetch_catalog(&mut self, ids: &[Uuid]) -> Result<HashMap<CatalogEntryId, CatalogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r"SELECT id, name, rarity, rate_amount, rate_interval_secs, price, active, available_from, available_until, pools
              FROM catalog_entries
              WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(backend)?;

        let mut entries = HashMap::with_capacity(rows.len());
        for row in rows {
            let entry = CatalogEntry::try_from(row)?;
            entries.insert(entry.id, entry);
        }
        Ok(entries)
    }
}

impl StoreTx for PgTx {
    async fn lock_user(&mut self, user: UserId, now: DateTime<Utc>) -> Result<UserAccount, StoreError> {
        sqlx::query(r"INSERT INTO users (id, created_at) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
            .bind(user.into_inner())
            .bind(now)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;

        let row = sqlx::query_as::<_, UserRow>(
            r"SELECT id, balance, essence, last_accrual_at, tier, created_at
              FROM users
              WHERE id = $1
              FOR UPDATE",
        )
        .bind(user.into_inner())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(backend)?;

        UserAccount::try_from(row)
    }

    async fn adjust_balance(&mut self, user: UserId, delta: i64) -> Result<BalanceUpdate, StoreError> {
        self.adjust(user, delta, false).await
    }

    async fn adjust_essence(&mut self, user: UserId, delta: i64) -> Result<BalanceUpdate, StoreError> {
        self.adjust(user, delta, true).await
    }

    async fn set_last_accrual(&mut self, user: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(r"UPDATE users SET last_accrual_at = $2 WHERE id = $1")
            .bind(user.into_inner())
            .bind(at)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn set_tier(&mut self, user: UserId, tier: u32) -> Result<(), StoreError> {
        sqlx::query(r"UPDATE users SET tier = $2 WHERE id = $1")
            .bind(user.into_inner())
            .bind(signed("users.tier", tier)?)
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list_owner_ids(&mut self) -> Result<Vec<UserId>, StoreError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(r"SELECT DISTINCT user_id FROM ownerships ORDER BY user_id")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(ids.into_iter().map(UserId::from).collect())
    }

    async fn get_catalog_entry(&mut self, id: CatalogEntryId) -> Result<Option<CatalogEntry>, StoreError> {
        let mut found = self.fetch_catalog(&[id.into_inner()]).await?;
        Ok(found.remove(&id))
    }

    async fn list_eligible_entries(
        &mut self,
        pool: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<CatalogEntry>, StoreError> {
        let rows = sqlx::query_as::<_, CatalogRow>(
            r"SELECT id, name, rarity, rate_amount, rate_interval_secs, price, active, available_from, available_until, pools
              FROM catalog_entries
              WHERE active
                AND rarity <> 'divine'
                AND $1 = ANY(pools)
                AND (available_from IS NULL OR available_from <= $2)
                AND (available_until IS NULL OR $2 < available_until)
              ORDER BY id",
        )
        .bind(pool)
        .bind(now)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(backend)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let entry = CatalogEntry::try_from(row)?;
            if entry.is_eligible(pool, now) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    async fn get_ownership(
        &mut self,
        user: UserId,
        entry: CatalogEntryId,
    ) -> Result<Option<OwnershipRecord>, StoreError> {
        let row = sqlx::query_as::<_, OwnershipRow>(
            r"SELECT id, user_id, entry_id, rarity, level, dup_count, status, status_since, last_fed_at, last_played_at, obtained_at
              FROM ownerships
              WHERE user_id = $1 AND entry_id = $2",
        )
        .bind(user.into_inner())
        .bind(entry.into_inner())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;
        row.map(OwnershipRecord::try_from).transpose()
    }

    async fn get_ownership_by_id(&mut self, id: OwnershipId) -> Result<Option<OwnershipRecord>, StoreError> {
        let row = sqlx::query_as::<_, OwnershipRow>(
            r"SELECT id, user_id, entry_id, rarity, level, dup_count, status, status_since, last_fed_at, last_played_at, obtained_at
              FROM ownerships
              WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;
        row.map(OwnershipRecord::try_from).transpose()
    }

    async fn list_owned_entries(
        &mut self,
        user: UserId,
    ) -> Result<Vec<(OwnershipRecord, CatalogEntry)>, StoreError> {
        let rows = sqlx::query_as::<_, OwnershipRow>(
            r"SELECT id, user_id, entry_id, rarity, level, dup_count, status, status_since, last_fed_at, last_played_at, obtained_at
              FROM ownerships
              WHERE user_id = $1
              ORDER BY obtained_at, id",
        )
        .bind(user.into_inner())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(backend)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.entry_id).collect();
        let catalog = self.fetch_catalog(&ids).await?;

        let mut owned = Vec::with_capacity(rows.len());
        for row in rows {
            let record = OwnershipRecord::try_from(row)?;
            let entry = catalog.get(&record.entry_id).cloned().ok_or_else(|| {
                StoreError::InvalidData(format!("ownership {} references unknown entry", record.id))
            })?;
            owned.push((record, entry));
        }
        Ok(owned)
    }

    async fn upsert_ownership(&mut self, record: &OwnershipRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO ownerships (id, user_id, entry_id, rarity, level, dup_count, status, status_since, last_fed_at, last_played_at, obtained_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
              ON CONFLICT (id) DO UPDATE SET
                level = EXCLUDED.level,
                dup_count = EXCLUDED.dup_count,
                status = EXCLUDED.status,
                status_since = EXCLUDED.status_since,
                last_fed_at = EXCLUDED.last_fed_at,
                last_played_at = EXCLUDED.last_played_at",
        )
        .bind(record.id.into_inner())
        .bind(record.user_id.into_inner())
        .bind(record.entry_id.into_inner())
        .bind(record.rarity.as_str())
        .bind(signed("ownerships.level", record.level)?)
        .bind(signed("ownerships.dup_count", record.dup_count)?)
        .bind(record.status.as_str())
        .bind(record.status_since)
        .bind(record.last_fed_at)
        .bind(record.last_played_at)
        .bind(record.obtained_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn delete_ownership(&mut self, id: OwnershipId) -> Result<(), StoreError> {
        // Equipment rows go with it (ON DELETE CASCADE).
        sqlx::query(r"DELETE FROM ownerships WHERE id = $1")
            .bind(id.into_inner())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_pity(&mut self, user: UserId, pool: &str) -> Result<u32, StoreError> {
        let value: Option<i32> =
            sqlx::query_scalar(r"SELECT value FROM pity_counters WHERE user_id = $1 AND pool = $2")
                .bind(user.into_inner())
                .bind(pool)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(backend)?;
        u32::try_from(value.unwrap_or(0)).map_err(|e| invalid("pity_counters.value", e))
    }

    async fn set_pity(&mut self, user: UserId, pool: &str, value: u32) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO pity_counters (user_id, pool, value) VALUES ($1, $2, $3)
              ON CONFLICT (user_id, pool) DO UPDATE SET value = EXCLUDED.value",
        )
        .bind(user.into_inner())
        .bind(pool)
        .bind(signed("pity_counters.value", value)?)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_item(&mut self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(r"SELECT id, name, effect FROM items WHERE id = $1")
            .bind(id.into_inner())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(row.map(Item::from))
    }

    async fn list_holdings(&mut self, user: UserId) -> Result<Vec<ItemHolding>, StoreError> {
        let rows = sqlx::query_as::<_, HoldingRow>(
            r"SELECT i.id, i.name, i.effect, h.quantity
              FROM holdings h
              JOIN items i ON i.id = h.item_id
              WHERE h.user_id = $1 AND h.quantity > 0
              ORDER BY i.id",
        )
        .bind(user.into_inner())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(backend)?;
        rows.into_iter().map(ItemHolding::try_from).collect()
    }

    async fn add_holding(&mut self, user: UserId, item: ItemId, quantity: u32) -> Result<u32, StoreError> {
        let held: i32 = sqlx::query_scalar(
            r"INSERT INTO holdings (user_id, item_id, quantity) VALUES ($1, $2, $3)
              ON CONFLICT (user_id, item_id) DO UPDATE SET quantity = holdings.quantity + EXCLUDED.quantity
              RETURNING quantity",
        )
        .bind(user.into_inner())
        .bind(item.into_inner())
        .bind(signed("holdings.quantity", quantity)?)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(backend)?;
        u32::try_from(held).map_err(|e| invalid("holdings.quantity", e))
    }

    async fn list_equipment(&mut self, user: UserId) -> Result<Vec<(OwnershipId, Item)>, StoreError> {
        let rows = sqlx::query_as::<_, EquipmentRow>(
            r"SELECT e.ownership_id, i.id, i.name, i.effect
              FROM equipment e
              JOIN ownerships o ON o.id = e.ownership_id
              JOIN items i ON i.id = e.item_id
              WHERE o.user_id = $1
              ORDER BY e.ownership_id, i.id",
        )
        .bind(user.into_inner())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn equip(&mut self, ownership: OwnershipId, item: ItemId) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO equipment (ownership_id, item_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(ownership.into_inner())
        .bind(item.into_inner())
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn unequip(&mut self, ownership: OwnershipId, item: ItemId) -> Result<bool, StoreError> {
        let result = sqlx::query(r"DELETE FROM equipment WHERE ownership_id = $1 AND item_id = $2")
            .bind(ownership.into_inner())
            .bind(item.into_inner())
            .execute(&mut *self.tx)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_companion(&mut self, user: UserId) -> Result<Option<Companion>, StoreError> {
        let row = sqlx::query_as::<_, CompanionRow>(
            r"SELECT user_id, satiety, happiness, alive, last_tick_at FROM companions WHERE user_id = $1",
        )
        .bind(user.into_inner())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(backend)?;
        row.map(Companion::try_from).transpose()
    }

    async fn upsert_companion(&mut self, companion: &Companion) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO companions (user_id, satiety, happiness, alive, last_tick_at)
              VALUES ($1, $2, $3, $4, $5)
              ON CONFLICT (user_id) DO UPDATE SET
                satiety = EXCLUDED.satiety,
                happiness = EXCLUDED.happiness,
                alive = EXCLUDED.alive,
                last_tick_at = EXCLUDED.last_tick_at",
        )
        .bind(companion.user_id.into_inner())
        .bind(i16::from(companion.satiety))
        .bind(i16::from(companion.happiness))
        .bind(companion.alive)
        .bind(companion.last_tick_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r"INSERT INTO audit_log (id, user_id, action, amount, essence, reference_id, metadata, created_at)
              VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entry.id.into_inner())
        .bind(entry.user_id.into_inner())
        .bind(entry.action.as_str())
        .bind(entry.amount)
        .bind(entry.essence)
        .bind(entry.reference_id)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await.map_err(|e| {
            tracing::warn!(error = %e, "economy transaction commit failed");
            backend(e)
        })
    }
}
