//! Fixtures shared by the unit tests in this crate.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rust_decimal::Decimal;

use whisker_types::{CatalogEntry, CatalogEntryId, Item, ItemEffect, ItemId, Rarity, UserAccount, UserId};

use crate::memory::MemoryStore;

pub const POOL: &str = "standard";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("fixed timestamp is valid"))
}

pub fn at(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn rng() -> SmallRng {
    SmallRng::seed_from_u64(7)
}

pub fn entry(name: &str, rarity: Rarity, rate_amount: Decimal, interval: i64, price: i64) -> CatalogEntry {
    CatalogEntry {
        id: CatalogEntryId::new(),
        name: name.to_owned(),
        rarity,
        rate_amount,
        rate_interval_secs: interval,
        price,
        active: true,
        available_from: None,
        available_until: None,
        pools: BTreeSet::from([POOL.to_owned()]),
    }
}

pub fn item(name: &str, effect: ItemEffect) -> Item {
    Item {
        id: ItemId::new(),
        name: name.to_owned(),
        effect,
    }
}

/// A store holding one user with `balance` and the given catalog.
pub async fn store_with(balance: i64, catalog: &[CatalogEntry]) -> (MemoryStore, UserId) {
    let store = MemoryStore::new();
    let user = UserId::new();
    let mut account = UserAccount::new(user, t0());
    account.balance = balance;
    store.seed_user(account).await;
    for e in catalog {
        store.insert_catalog_entry(e.clone()).await;
    }
    (store, user)
}

pub async fn balance(store: &MemoryStore, user: UserId) -> i64 {
    store.snapshot().await.user(user).map_or(-1, |u| u.balance)
}

/// Unwrap an operation result that must be a success.
pub fn ok<T, R: core::fmt::Debug, E: core::fmt::Display>(result: Result<Result<T, R>, E>) -> T {
    match result {
        Ok(Ok(value)) => value,
        Ok(Err(rejection)) => panic!("unexpected rejection: {rejection:?}"),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

/// Unwrap an operation result that must be a rejection.
pub fn rejected<T: core::fmt::Debug, R, E: core::fmt::Display>(result: Result<Result<T, R>, E>) -> R {
    match result {
        Ok(Err(rejection)) => rejection,
        Ok(Ok(value)) => panic!("expected rejection, got {value:?}"),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

/// Unwrap an infallible-by-rules result.
pub fn done<T, E: core::fmt::Display>(result: Result<T, E>) -> T {
    result.unwrap_or_else(|e| panic!("unexpected error: {e}"))
}
