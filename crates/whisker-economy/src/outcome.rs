//! Typed business rejections.
//!
//! Every economy operation returns `Result<Result<T, Rejection>, EconomyError>`
//! (aliased as [`Outcome`]). The outer layer carries infrastructure
//! failures; the inner layer distinguishes success from an expected,
//! retry-safe rejection. A rejected operation never leaves partial state.

use crate::error::EconomyError;

/// Result of an economy operation that may be rejected by business rules.
pub type Outcome<T> = Result<Result<T, Rejection>, EconomyError>;

/// Expected reasons an operation declines to proceed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// The user cannot afford the operation.
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds {
        /// Price of the operation.
        required: i64,
        /// Balance at the time of the check.
        available: i64,
    },

    /// The pool has no eligible entries right now.
    #[error("pool {pool} has no eligible entries")]
    EmptyPool {
        /// Pool name.
        pool: String,
    },

    /// A referenced record does not exist or belongs to someone else.
    #[error("{what} not found")]
    NotFound {
        /// What was looked up.
        what: &'static str,
    },

    /// The catalog entry is inactive, outside its window, or admin-only.
    #[error("entry is not available")]
    Unavailable,

    /// The target has died.
    #[error("target is dead")]
    EntityDead,

    /// The item is already equipped on this cat.
    #[error("item already equipped")]
    AlreadyEquipped,

    /// The item is not equipped on this cat.
    #[error("item not equipped")]
    NotEquipped,

    /// Every equipment slot on this cat is taken.
    #[error("all {capacity} slots are in use")]
    SlotsFull {
        /// Slot capacity for the owner's tier.
        capacity: u32,
    },

    /// The user holds no free unit of the item.
    #[error("no free unit of the item is held")]
    ItemNotHeld,

    /// The account is already at the highest tier.
    #[error("already at max tier {tier}")]
    MaxTier {
        /// Current tier.
        tier: u32,
    },

    /// The request itself is malformed.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// What is wrong with it.
        reason: String,
    },
}

impl Rejection {
    /// Shorthand for [`Rejection::InvalidInput`].
    pub fn invalid(reason: &str) -> Self {
        Self::InvalidInput {
            reason: reason.to_owned(),
        }
    }
}
