//! Stat-decay model for the home companion.
//!
//! Independent from ownership records and their deadlines. A companion
//! has satiety and happiness in `0..=100`:
//!
//! - Each whole elapsed hour removes `satiety_decay_per_hour` and
//!   `happiness_decay_per_hour`, clamped at 0
//! - Partial hours are carried: `last_tick_at` advances by whole hours only
//! - The companion dies when satiety is 0 after decay and the time since the
//!   previous tick exceeds `starvation_timeout_hours`
//!
//! Ticks happen whenever the owner interacts, so death means starving
//! while nobody looked for longer than the timeout.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, Companion, UserId};

use crate::config::CompanionConfig;
use crate::error::EconomyError;
use crate::outcome::{Outcome, Rejection};
use crate::store::{EconomyStore, StoreTx, record};

const STAT_MAX: u8 = 100;

/// Result of applying decay to a companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionTick {
    /// The companion after decay.
    pub companion: Companion,
    /// Whole hours of decay applied.
    pub hours_applied: i64,
    /// Whether the companion died during this tick.
    pub died: bool,
}

fn decay_stat(stat: u8, per_hour: u8, hours: i64) -> u8 {
    let loss = i64::from(per_hour).saturating_mul(hours);
    let left = i64::from(stat.min(STAT_MAX)).saturating_sub(loss).max(0);
    u8::try_from(left).unwrap_or(0)
}

fn restore_stat(stat: u8, amount: u8) -> u8 {
    stat.saturating_add(amount).min(STAT_MAX)
}

/// Apply decay up to `now`. Pure.
pub fn apply_decay(
    companion: &Companion,
    config: &CompanionConfig,
    now: DateTime<Utc>,
) -> Result<CompanionTick, EconomyError> {
    let mut next = companion.clone();
    if !companion.alive || now <= companion.last_tick_at {
        return Ok(CompanionTick {
            companion: next,
            hours_applied: 0,
            died: false,
        });
    }

    let elapsed = now.signed_duration_since(companion.last_tick_at);
    let hours = elapsed.num_hours();
    if hours > 0 {
        next.satiety = decay_stat(companion.satiety, config.satiety_decay_per_hour, hours);
        next.happiness = decay_stat(companion.happiness, config.happiness_decay_per_hour, hours);
        next.last_tick_at = TimeDelta::try_hours(hours)
            .and_then(|span| companion.last_tick_at.checked_add_signed(span))
            .ok_or_else(|| EconomyError::overflow("companion tick instant"))?;
    }

    let timeout = TimeDelta::try_hours(config.starvation_timeout_hours)
        .ok_or_else(|| EconomyError::overflow("starvation timeout"))?;
    let died = next.satiety == 0 && elapsed > timeout;
    if died {
        next.alive = false;
    }

    Ok(CompanionTick {
        companion: next,
        hours_applied: hours.max(0),
        died,
    })
}

/// Bring the user's companion up to date, adopting one on first touch.
pub async fn tick_companion<S: EconomyStore>(
    store: &S,
    config: &CompanionConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<CompanionTick, EconomyError> {
    let mut tx = store.begin().await?;
    let tick = tick_in_tx(&mut tx, config, user, now).await?;
    tx.commit().await?;
    Ok(tick)
}

async fn tick_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &CompanionConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<CompanionTick, EconomyError> {
    tx.lock_user(user, now).await?;
    let Some(current) = tx.get_companion(user).await? else {
        let adopted = Companion::adopt(user, now);
        tx.upsert_companion(&adopted).await?;
        tracing::debug!(user_id = %user, "companion adopted");
        return Ok(CompanionTick {
            companion: adopted,
            hours_applied: 0,
            died: false,
        });
    };

    let tick = apply_decay(&current, config, now)?;
    if tick.companion != current {
        tx.upsert_companion(&tick.companion).await?;
    }
    if tick.died {
        tracing::info!(user_id = %user, "companion starved");
    }
    Ok(tick)
}

/// Feed the companion, restoring satiety.
pub async fn feed_companion<S: EconomyStore>(
    store: &S,
    config: &CompanionConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Outcome<Companion> {
    tend(store, config, user, now, Stat::Satiety).await
}

/// Play with the companion, restoring happiness.
pub async fn play_companion<S: EconomyStore>(
    store: &S,
    config: &CompanionConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Outcome<Companion> {
    tend(store, config, user, now, Stat::Happiness).await
}

#[derive(Debug, Clone, Copy)]
enum Stat {
    Satiety,
    Happiness,
}

async fn tend<S: EconomyStore>(
    store: &S,
    config: &CompanionConfig,
    user: UserId,
    now: DateTime<Utc>,
    stat: Stat,
) -> Outcome<Companion> {
    let mut tx = store.begin().await?;
    let tick = tick_in_tx(&mut tx, config, user, now).await?;
    if !tick.companion.alive {
        // Persist a death discovered by this tick before rejecting.
        if tick.died {
            tx.commit().await?;
        }
        return Ok(Err(Rejection::EntityDead));
    }

    let mut companion = tick.companion;
    let action = match stat {
        Stat::Satiety => {
            companion.satiety = restore_stat(companion.satiety, config.feed_restore);
            "feed"
        }
        Stat::Happiness => {
            companion.happiness = restore_stat(companion.happiness, config.play_restore);
            "play"
        }
    };
    tx.upsert_companion(&companion).await?;
    record(
        &mut tx,
        AuditEntryBuilder::new(user, AuditAction::Care)
            .metadata(json!({
                "target": "companion",
                "action": action,
                "satiety": companion.satiety,
                "happiness": companion.happiness,
            }))
            .at(now),
    )
    .await?;
    tx.commit().await?;
    Ok(Ok(companion))
}
