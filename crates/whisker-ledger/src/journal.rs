//! The audit journal: an append-only log of balance-affecting events.
//!
//! The [`AuditJournal`] is the in-memory representation of the audit log.
//! The in-memory store keeps one; the database store writes the same
//! entries to the `audit_log` table instead.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **Paired**: every balance mutation has exactly one entry.
//! - **Integer**: currency and essence deltas are whole units.

use whisker_types::{AuditAction, AuditEntry, UserId};

use crate::reconcile::{Balances, ReconcileResult, reconcile};

/// Append-only journal of [`AuditEntry`] values.
#[derive(Debug, Clone, Default)]
pub struct AuditJournal {
    /// All entries, in insertion order.
    entries: Vec<AuditEntry>,
}

impl AuditJournal {
    /// Create a new empty journal.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Return the number of entries in the journal.
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Return whether the journal has no entries.
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a pre-built entry.
    pub fn append(&mut self, entry: AuditEntry) {
        tracing::trace!(
            user_id = %entry.user_id,
            action = %entry.action,
            amount = entry.amount,
            "audit entry appended"
        );
        self.entries.push(entry);
    }

    /// All entries in insertion order.
    pub fn all_entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Entries belonging to one user, in insertion order.
    pub fn entries_for(&self, user_id: UserId) -> Vec<&AuditEntry> {
        self.entries.iter().filter(|e| e.user_id == user_id).collect()
    }

    /// Entries of one action kind for one user.
    pub fn entries_of(&self, user_id: UserId, action: AuditAction) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id && e.action == action)
            .collect()
    }

    /// Net currency delta journaled for a user. Saturates instead of
    /// overflowing.
    pub fn net_currency(&self, user_id: UserId) -> i64 {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .fold(0_i64, |acc, e| acc.saturating_add(e.amount))
    }

    /// Reconcile a user's balances against the whole journal.
    pub fn reconcile(&self, user_id: UserId, opening: Balances, closing: Balances) -> ReconcileResult {
        reconcile(user_id, opening, closing, &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuditEntryBuilder;

    fn entry(user: UserId, action: AuditAction, amount: i64) -> AuditEntry {
        AuditEntryBuilder::new(user, action)
            .amount(amount)
            .build()
            .unwrap_or_else(|e| panic!("test entry rejected: {e}"))
    }

    #[test]
    fn new_journal_is_empty() {
        let journal = AuditJournal::new();
        assert!(journal.is_empty());
        assert_eq!(journal.len(), 0);
    }

    #[test]
    fn entries_are_filtered_per_user() {
        let alice = UserId::new();
        let bob = UserId::new();
        let mut journal = AuditJournal::new();
        journal.append(entry(alice, AuditAction::Accrual, 10));
        journal.append(entry(bob, AuditAction::Accrual, 3));
        journal.append(entry(alice, AuditAction::Draw, -4));

        assert_eq!(journal.entries_for(alice).len(), 2);
        assert_eq!(journal.entries_of(alice, AuditAction::Draw).len(), 1);
        assert_eq!(journal.net_currency(alice), 6);
        assert_eq!(journal.net_currency(bob), 3);
    }

    #[test]
    fn journal_reconciles_matching_balances() {
        let user = UserId::new();
        let mut journal = AuditJournal::new();
        journal.append(entry(user, AuditAction::Accrual, 50));
        journal.append(entry(user, AuditAction::Purchase, -20));

        let result = journal.reconcile(
            user,
            Balances { currency: 0, essence: 0 },
            Balances { currency: 30, essence: 0 },
        );
        assert_eq!(result, ReconcileResult::Balanced);
    }
}
