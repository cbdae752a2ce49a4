//! Error types for the whisker-economy crate.
//!
//! Only infrastructure failures and broken invariants are errors. Expected
//! business outcomes (insufficient funds, empty pool, dead cat) are
//! [`Rejection`](crate::outcome::Rejection) values instead.

use whisker_ledger::LedgerError;

/// Failures reported by an [`EconomyStore`](crate::store::EconomyStore)
/// implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backing storage failed (connection lost, query error, commit
    /// rejected).
    #[error("store backend failure: {0}")]
    Backend(String),

    /// A stored row could not be decoded into a typed record.
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}

/// Errors that can occur while running an economy operation.
///
/// When an operation returns an error, nothing it did was committed.
#[derive(Debug, thiserror::Error)]
pub enum EconomyError {
    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// An arithmetic overflow occurred.
    #[error("arithmetic overflow: {context}")]
    ArithmeticOverflow {
        /// Description of what was being computed.
        context: String,
    },

    /// An audit entry violated the ledger's sign contract.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl EconomyError {
    /// Shorthand for [`EconomyError::ArithmeticOverflow`].
    pub fn overflow(context: &str) -> Self {
        Self::ArithmeticOverflow {
            context: context.to_owned(),
        }
    }
}
