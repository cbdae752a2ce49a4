//! Deadline-driven lifecycle of owned cats.
//!
//! Each record has two deadlines derived from its care timestamps and its
//! rarity:
//!
//! - `feed_deadline = last_fed_at + feed_deadline_days(rarity)`
//! - `play_deadline = last_played_at + play_deadline_days(rarity)`
//!
//! Missing timestamps fall back to `obtained_at`. The feed deadline wins:
//! a record past it is `Dead` whatever its play deadline says. A record
//! only past the play deadline is `Neglected`. `Dead` is terminal.
//!
//! Cleanup runs after evaluation. In [`SurvivalMode::Runaway`] records
//! that stay neglected past the recovery window are released (deleted).
//! With `dead_retention_hours` set, dead records are released after that
//! long in either mode.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::json;

use whisker_ledger::AuditEntryBuilder;
use whisker_types::{AuditAction, OwnershipRecord, OwnershipStatus, UserId};

use crate::config::{SurvivalConfig, SurvivalMode};
use crate::error::EconomyError;
use crate::store::{EconomyStore, StoreTx, record};

/// Status before and after an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Stored status.
    pub from: OwnershipStatus,
    /// Status the deadlines call for at the evaluation instant.
    pub to: OwnershipStatus,
}

impl Transition {
    /// Whether the evaluation changes the stored status.
    pub fn is_change(self) -> bool {
        self.from != self.to
    }
}

/// Counts from one user's evaluation, or a whole sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurvivalReport {
    /// Records evaluated.
    pub evaluated: usize,
    /// Records that died.
    pub died: usize,
    /// Records that ran away (became neglected).
    pub neglected: usize,
    /// Neglected records whose care stamps made them active again.
    pub recovered: usize,
    /// Records deleted by cleanup.
    pub released: usize,
}

impl SurvivalReport {
    fn absorb(&mut self, other: Self) {
        self.evaluated = self.evaluated.saturating_add(other.evaluated);
        self.died = self.died.saturating_add(other.died);
        self.neglected = self.neglected.saturating_add(other.neglected);
        self.recovered = self.recovered.saturating_add(other.recovered);
        self.released = self.released.saturating_add(other.released);
    }
}

/// Result of a full sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Users whose records were evaluated.
    pub users: usize,
    /// Users whose evaluation failed and was rolled back.
    pub failed: usize,
    /// Summed per-user counts.
    pub totals: SurvivalReport,
}

fn deadline(from: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days)).and_then(|span| from.checked_add_signed(span))
}

fn passed(deadline: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    // An unrepresentable deadline is never reached.
    deadline.is_some_and(|d| now >= d)
}

fn held_longer_than(since: DateTime<Utc>, hours: i64, now: DateTime<Utc>) -> bool {
    TimeDelta::try_hours(hours)
        .and_then(|span| since.checked_add_signed(span))
        .is_some_and(|limit| now > limit)
}

/// Evaluate a record's deadlines at `now`. Pure.
pub fn evaluate_survival(
    record: &OwnershipRecord,
    config: &SurvivalConfig,
    now: DateTime<Utc>,
) -> Transition {
    let from = record.status;
    if from.is_terminal() {
        return Transition { from, to: from };
    }

    let fed = record.last_fed_at.unwrap_or(record.obtained_at);
    let played = record.last_played_at.unwrap_or(record.obtained_at);
    let feed_deadline = deadline(fed, *config.feed_deadline_days.get(record.rarity));
    let play_deadline = deadline(played, *config.play_deadline_days.get(record.rarity));

    let to = if passed(feed_deadline, now) {
        OwnershipStatus::Dead
    } else if passed(play_deadline, now) {
        OwnershipStatus::Neglected
    } else {
        OwnershipStatus::Active
    };
    Transition { from, to }
}

/// Store an evaluated transition and journal it. No-op when nothing changes.
pub(crate) async fn apply_transition<T: StoreTx>(
    tx: &mut T,
    current: &mut OwnershipRecord,
    transition: Transition,
    now: DateTime<Utc>,
) -> Result<(), EconomyError> {
    if !transition.is_change() {
        return Ok(());
    }
    current.set_status(transition.to, now);
    tx.upsert_ownership(current).await?;
    record(
        tx,
        AuditEntryBuilder::new(current.user_id, AuditAction::Decay)
            .reference(current.id)
            .metadata(json!({ "from": transition.from, "to": transition.to }))
            .at(now),
    )
    .await?;

    match transition.to {
        OwnershipStatus::Dead => tracing::info!(
            user_id = %current.user_id,
            ownership_id = %current.id,
            "record died of hunger"
        ),
        OwnershipStatus::Neglected => tracing::info!(
            user_id = %current.user_id,
            ownership_id = %current.id,
            "record ran away"
        ),
        OwnershipStatus::Active => tracing::debug!(
            user_id = %current.user_id,
            ownership_id = %current.id,
            "record recovered"
        ),
    }
    Ok(())
}

/// Evaluate and clean up every record owned by `user`.
pub async fn evaluate_user<S: EconomyStore>(
    store: &S,
    config: &SurvivalConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<SurvivalReport, EconomyError> {
    let mut tx = store.begin().await?;
    tx.lock_user(user, now).await?;
    let report = evaluate_in_tx(&mut tx, config, user, now).await?;
    tx.commit().await?;
    Ok(report)
}

async fn evaluate_in_tx<T: StoreTx>(
    tx: &mut T,
    config: &SurvivalConfig,
    user: UserId,
    now: DateTime<Utc>,
) -> Result<SurvivalReport, EconomyError> {
    let mut report = SurvivalReport::default();

    for (mut current, _entry) in tx.list_owned_entries(user).await? {
        report.evaluated = report.evaluated.saturating_add(1);
        let transition = evaluate_survival(&current, config, now);
        apply_transition(tx, &mut current, transition, now).await?;
        if transition.is_change() {
            match transition.to {
                OwnershipStatus::Dead => report.died = report.died.saturating_add(1),
                OwnershipStatus::Neglected => report.neglected = report.neglected.saturating_add(1),
                OwnershipStatus::Active => report.recovered = report.recovered.saturating_add(1),
            }
        }

        if let Some(reason) = release_reason(&current, config, now) {
            tx.delete_ownership(current.id).await?;
            record(
                tx,
                AuditEntryBuilder::new(user, AuditAction::Released)
                    .reference(current.id)
                    .metadata(json!({ "entry_id": current.entry_id, "reason": reason }))
                    .at(now),
            )
            .await?;
            report.released = report.released.saturating_add(1);
            tracing::info!(user_id = %user, ownership_id = %current.id, reason, "record released");
        }
    }
    Ok(report)
}

fn release_reason(
    current: &OwnershipRecord,
    config: &SurvivalConfig,
    now: DateTime<Utc>,
) -> Option<&'static str> {
    match current.status {
        OwnershipStatus::Neglected
            if config.mode == SurvivalMode::Runaway
                && held_longer_than(current.status_since, config.recovery_window_hours, now) =>
        {
            Some("runaway")
        }
        OwnershipStatus::Dead
            if config
                .dead_retention_hours
                .is_some_and(|hours| held_longer_than(current.status_since, hours, now)) =>
        {
            Some("dead")
        }
        _ => None,
    }
}

/// Evaluate every owner. Each user runs in its own transaction; a failed
/// user is logged, rolled back and skipped.
pub async fn sweep<S: EconomyStore>(
    store: &S,
    config: &SurvivalConfig,
    now: DateTime<Utc>,
) -> Result<SweepReport, EconomyError> {
    let owners = {
        let mut tx = store.begin().await?;
        tx.list_owner_ids().await?
    };

    let mut sweep = SweepReport::default();
    for user in owners {
        match evaluate_user(store, config, user, now).await {
            Ok(report) => {
                sweep.users = sweep.users.saturating_add(1);
                sweep.totals.absorb(report);
            }
            Err(e) => {
                sweep.failed = sweep.failed.saturating_add(1);
                tracing::warn!(user_id = %user, error = %e, "survival evaluation failed");
            }
        }
    }

    tracing::info!(
        users = sweep.users,
        failed = sweep.failed,
        died = sweep.totals.died,
        neglected = sweep.totals.neglected,
        released = sweep.totals.released,
        "survival sweep complete"
    );
    Ok(sweep)
}
