//! Audit journal and balance reconciliation for the Whisker economy.
//!
//! Every balance mutation in the economy is paired with an [`AuditEntry`]
//! written by the same transaction. This crate builds those entries,
//! keeps an in-memory journal of them, and checks that a user's balance
//! movement is fully explained by the journal.
//!
//! # Architecture
//!
//! - [`audit`] -- The [`AuditEntryBuilder`] for validated entry construction.
//! - [`journal`] -- The [`AuditJournal`]: append-only in-memory log.
//! - [`reconcile`] -- Balance reconciliation and anomaly detection.
//!
//! # Reconciliation Law
//!
//! For every user U and every window of entries:
//!
//! ```text
//! closing_balance(U) - opening_balance(U) == sum(amount of U's entries)
//! closing_essence(U) - opening_essence(U) == sum(essence of U's entries)
//! ```
//!
//! A violation produces a [`BalanceAnomaly`]. The ledger never panics; it
//! returns errors.
//!
//! # Sign Contract
//!
//! | Action | Currency delta |
//! |--------|----------------|
//! | Accrual | positive |
//! | Draw, Purchase, Care, `TierUpgrade` | zero or negative |
//! | everything else | zero |
//!
//! # Usage
//!
//! ```
//! use whisker_ledger::{AuditEntryBuilder, AuditJournal, Balances};
//! use whisker_ledger::reconcile::{ReconcileResult, reconcile};
//! use whisker_types::{AuditAction, UserId};
//!
//! let user = UserId::new();
//! let mut journal = AuditJournal::new();
//!
//! // Passive income of 36, then a draw costing 10.
//! journal.append(AuditEntryBuilder::new(user, AuditAction::Accrual).amount(36).build()?);
//! journal.append(AuditEntryBuilder::new(user, AuditAction::Draw).amount(-10).build()?);
//!
//! let opening = Balances { currency: 100, essence: 0 };
//! let closing = Balances { currency: 126, essence: 0 };
//! assert_eq!(
//!     reconcile(user, opening, closing, journal.all_entries()),
//!     ReconcileResult::Balanced
//! );
//! # Ok::<(), whisker_ledger::LedgerError>(())
//! ```

pub mod audit;
pub mod journal;
pub mod reconcile;

// Re-export primary types at crate root.
pub use audit::AuditEntryBuilder;
pub use journal::AuditJournal;
pub use reconcile::{Balances, ReconcileResult};

use whisker_types::{AuditAction, UserId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when building audit entries.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The currency delta has the wrong sign for the action.
    #[error("invalid currency delta for {action}: {amount}")]
    InvalidAmount {
        /// The action being recorded.
        action: AuditAction,
        /// The rejected delta.
        amount: i64,
    },

    /// Essence deltas must not be negative.
    #[error("essence delta must not be negative, got {essence}")]
    NegativeEssence {
        /// The rejected delta.
        essence: i64,
    },
}

// ---------------------------------------------------------------------------
// Anomaly type
// ---------------------------------------------------------------------------

/// A reconciliation failure: balances moved without matching audit entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceAnomaly {
    /// The user whose balances do not reconcile.
    pub user_id: UserId,
    /// Currency movement observed on the account (closing - opening).
    pub observed_currency: i64,
    /// Currency movement explained by the journal.
    pub journaled_currency: i64,
    /// Essence movement observed on the account.
    pub observed_essence: i64,
    /// Essence movement explained by the journal.
    pub journaled_essence: i64,
    /// Human-readable description of the anomaly.
    pub message: String,
}

impl core::fmt::Display for BalanceAnomaly {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.message)
    }
}
