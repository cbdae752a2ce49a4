//! Balance reconciliation against the audit journal.
//!
//! The reconciliation law enforces that a user's balances only move through
//! journaled events: the observed change between an opening and a closing
//! snapshot must equal the sum of the user's audit deltas over the same
//! window.
//!
//! The economy writes the balance change and the audit entry in one
//! transaction, so this check passes by construction. It exists to catch
//! out-of-band edits and storage corruption.

use whisker_types::{AuditEntry, UserId};

use crate::BalanceAnomaly;

/// A snapshot of a user's two balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Balances {
    /// Primary currency.
    pub currency: i64,
    /// Secondary resource.
    pub essence: i64,
}

/// The result of a reconciliation check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileResult {
    /// Balances are fully explained by the journal.
    Balanced,
    /// Balances moved without matching entries (or vice versa).
    Anomaly(BalanceAnomaly),
}

/// Reconcile one user's balance movement against `entries`.
///
/// Entries belonging to other users are ignored, so the whole journal can
/// be passed in.
pub fn reconcile(
    user_id: UserId,
    opening: Balances,
    closing: Balances,
    entries: &[AuditEntry],
) -> ReconcileResult {
    let mut journaled_currency: i64 = 0;
    let mut journaled_essence: i64 = 0;

    for entry in entries.iter().filter(|e| e.user_id == user_id) {
        journaled_currency = match journaled_currency.checked_add(entry.amount) {
            Some(v) => v,
            None => return overflow_anomaly(user_id),
        };
        journaled_essence = match journaled_essence.checked_add(entry.essence) {
            Some(v) => v,
            None => return overflow_anomaly(user_id),
        };
    }

    let (Some(observed_currency), Some(observed_essence)) = (
        closing.currency.checked_sub(opening.currency),
        closing.essence.checked_sub(opening.essence),
    ) else {
        return overflow_anomaly(user_id);
    };

    if observed_currency == journaled_currency && observed_essence == journaled_essence {
        return ReconcileResult::Balanced;
    }

    tracing::warn!(
        user_id = %user_id,
        observed_currency,
        journaled_currency,
        observed_essence,
        journaled_essence,
        "balance reconciliation failed"
    );

    ReconcileResult::Anomaly(BalanceAnomaly {
        user_id,
        observed_currency,
        journaled_currency,
        observed_essence,
        journaled_essence,
        message: format!(
            "BALANCE_ANOMALY for user {user_id}: balance moved by {observed_currency} \
             but journal explains {journaled_currency}"
        ),
    })
}

/// Construct an anomaly result for arithmetic overflow during summation.
fn overflow_anomaly(user_id: UserId) -> ReconcileResult {
    ReconcileResult::Anomaly(BalanceAnomaly {
        user_id,
        observed_currency: 0,
        journaled_currency: 0,
        observed_essence: 0,
        journaled_essence: 0,
        message: format!("BALANCE_ANOMALY for user {user_id}: arithmetic overflow while summing"),
    })
}

#[cfg(test)]
mod tests {
    use whisker_types::AuditAction;

    use super::*;
    use crate::AuditEntryBuilder;

    fn entry(user: UserId, action: AuditAction, amount: i64, essence: i64) -> AuditEntry {
        AuditEntryBuilder::new(user, action)
            .amount(amount)
            .essence(essence)
            .build()
            .unwrap_or_else(|e| panic!("test entry rejected: {e}"))
    }

    #[test]
    fn empty_window_with_no_movement_is_balanced() {
        let result = reconcile(UserId::new(), Balances::default(), Balances::default(), &[]);
        assert_eq!(result, ReconcileResult::Balanced);
    }

    #[test]
    fn unexplained_credit_is_an_anomaly() {
        let user = UserId::new();
        let entries = [entry(user, AuditAction::Accrual, 10, 0)];
        let result = reconcile(
            user,
            Balances { currency: 0, essence: 0 },
            Balances { currency: 15, essence: 0 },
            &entries,
        );
        match result {
            ReconcileResult::Anomaly(a) => {
                assert_eq!(a.observed_currency, 15);
                assert_eq!(a.journaled_currency, 10);
                assert!(a.message.contains("BALANCE_ANOMALY"));
            }
            ReconcileResult::Balanced => panic!("expected anomaly"),
        }
    }

    #[test]
    fn essence_is_reconciled_separately() {
        let user = UserId::new();
        let entries = [entry(user, AuditAction::DuplicateAtMax, 0, 5)];
        let ok = reconcile(
            user,
            Balances { currency: 7, essence: 1 },
            Balances { currency: 7, essence: 6 },
            &entries,
        );
        assert_eq!(ok, ReconcileResult::Balanced);

        let bad = reconcile(
            user,
            Balances { currency: 7, essence: 1 },
            Balances { currency: 7, essence: 1 },
            &entries,
        );
        assert!(matches!(bad, ReconcileResult::Anomaly(_)));
    }

    #[test]
    fn other_users_entries_are_ignored() {
        let user = UserId::new();
        let other = UserId::new();
        let entries = [
            entry(other, AuditAction::Accrual, 99, 0),
            entry(user, AuditAction::Draw, -10, 0),
        ];
        let result = reconcile(
            user,
            Balances { currency: 100, essence: 0 },
            Balances { currency: 90, essence: 0 },
            &entries,
        );
        assert_eq!(result, ReconcileResult::Balanced);
    }
}
