//! Offline income accrual.
//!
//! A claim converts the time since the last claim into currency:
//!
//! 1. `elapsed = now - last_accrual_at`, never negative
//! 2. `capped = min(elapsed, cap_seconds(tier))`
//! 3. `raw = capped * rate` rounded to 12 decimal places, `earned = floor(raw)`
//! 4. The stored instant moves to `now - (raw - earned) / rate`, so the
//!    fractional unit not paid out is earned again by the next claim.
//!
//! Rates such as 7 per hour have no finite decimal form, so `capped * rate`
//! lands a hair under the whole unit it stands for. Rounding `raw` before
//! the floor pays that unit.
//!
//! The remainder is truncated to whole microseconds, which can only move
//! the stored instant later. Income is never paid twice.
//!
//! The first claim of an account only stamps the instant; nothing is paid
//! retroactively.

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, UserId};

use crate::config::{AccrualConfig, EconomyConfig};
use crate::error::{EconomyError, StoreError};
use crate::rate::rate_in_tx;
use crate::store::{BalanceUpdate, EconomyStore, StoreTx, record};

const MICROS_PER_SEC: i64 = 1_000_000;

/// Decimal places kept in the accrued amount before flooring.
const RAW_SCALE: u32 = 12;

/// Result of a claim (or a preview of one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccrualClaim {
    /// Whole currency units credited.
    pub earned: i64,
    /// Whole seconds of elapsed time that counted toward the claim.
    pub seconds_used: i64,
    /// Per-second rate used.
    pub rate: Decimal,
    /// The new stored accrual instant.
    pub accrued_until: DateTime<Utc>,
    /// `true` when this claim only initialized the accrual clock.
    pub initialized: bool,
}

/// Offline cap in seconds for an account tier.
pub fn cap_seconds(tier: u32, config: &AccrualConfig) -> i64 {
    let extra = i64::from(tier.saturating_sub(1)).saturating_mul(config.cap_per_tier_secs);
    config
        .base_cap_secs
        .saturating_add(extra)
        .min(config.max_cap_secs)
}

/// Work out what a claim at `now` pays and where it leaves the clock.
pub fn settle(
    last: Option<DateTime<Utc>>,
    rate: Decimal,
    cap_secs: i64,
    now: DateTime<Utc>,
) -> Result<AccrualClaim, EconomyError> {
    let Some(last) = last else {
        return Ok(AccrualClaim {
            earned: 0,
            seconds_used: 0,
            rate,
            accrued_until: now,
            initialized: true,
        });
    };

    let elapsed_us = if now <= last {
        0
    } else {
        now.signed_duration_since(last)
            .num_microseconds()
            .unwrap_or(i64::MAX)
    };
    let cap_us = cap_secs.max(0).saturating_mul(MICROS_PER_SEC);
    let capped_us = elapsed_us.min(cap_us);

    let capped_secs = Decimal::from(capped_us)
        .checked_div(Decimal::from(MICROS_PER_SEC))
        .ok_or_else(|| EconomyError::overflow("elapsed seconds"))?;
    let raw = capped_secs
        .checked_mul(rate)
        .ok_or_else(|| EconomyError::overflow("accrual amount"))?
        .round_dp(RAW_SCALE);
    let earned_units = raw.floor();
    let earned = earned_units
        .to_i64()
        .ok_or_else(|| EconomyError::overflow("accrual amount exceeds i64"))?;

    let accrued_until = if rate.is_zero() {
        now
    } else {
        let remainder_us = raw
            .checked_sub(earned_units)
            .and_then(|rem| rem.checked_div(rate))
            .and_then(|secs| secs.checked_mul(Decimal::from(MICROS_PER_SEC)))
            .and_then(|us| us.floor().to_i64())
            .ok_or_else(|| EconomyError::overflow("accrual remainder"))?;
        now.checked_sub_signed(TimeDelta::microseconds(remainder_us))
            .ok_or_else(|| EconomyError::overflow("accrual timestamp"))?
    };

    Ok(AccrualClaim {
        earned,
        seconds_used: capped_us.checked_div(MICROS_PER_SEC).unwrap_or(0),
        rate,
        accrued_until,
        initialized: false,
    })
}

/// Claim passive income for `user`.
///
/// Balance credit, clock update and the `Accrual` audit entry commit
/// together or not at all.
pub async fn claim_accrual<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<AccrualClaim, EconomyError> {
    let mut tx = store.begin().await?;
    let claim = claim_in_tx(&mut tx, config, user, now).await?;
    tx.commit().await?;

    tracing::debug!(
        user_id = %user,
        earned = claim.earned,
        seconds_used = claim.seconds_used,
        rate = %claim.rate,
        "accrual claimed"
    );
    Ok(claim)
}

/// What a claim at `now` would pay, without writing anything.
pub async fn preview_accrual<S: EconomyStore>(
    store: &S,
    config: &EconomyConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<AccrualClaim, EconomyError> {
    let mut tx = store.begin().await?;
    let account = tx.lock_user(user, now).await?;
    let rate = rate_in_tx(&mut tx, &config.rates, user).await?.rate;
    settle(
        account.last_accrual_at,
        rate,
        cap_seconds(account.tier, &config.accrual),
        now,
    )
}

async fn claim_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &EconomyConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<AccrualClaim, EconomyError> {
    let account = tx.lock_user(user, now).await?;
    let rate = rate_in_tx(tx, &config.rates, user).await?.rate;
    let claim = settle(
        account.last_accrual_at,
        rate,
        cap_seconds(account.tier, &config.accrual),
        now,
    )?;

    if claim.earned > 0 {
        if let BalanceUpdate::Insufficient { balance } = tx.adjust_balance(user, claim.earned).await? {
            return Err(StoreError::InvalidData(format!(
                "credit of {} refused at balance {balance}",
                claim.earned
            ))
            .into());
        }
        record(
            tx,
            AuditEntryBuilder::new(user, AuditAction::Accrual)
                .amount(claim.earned)
                .metadata(json!({
                    "seconds_used": claim.seconds_used,
                    "rate": claim.rate.to_string(),
                }))
                .at(now),
        )
        .await?;
    }
    tx.set_last_accrual(user, claim.accrued_until).await?;
    Ok(claim)
}
