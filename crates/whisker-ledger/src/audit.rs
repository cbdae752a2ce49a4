//! Audit entry builder and validation.
//!
//! Provides an [`AuditEntryBuilder`] that enforces the sign contract for
//! each [`AuditAction`]: income is positive, spending is non-positive,
//! bookkeeping-only actions move no currency. Builders validate inputs
//! before producing an [`AuditEntry`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use whisker_types::{AuditAction, AuditEntry, AuditEntryId, UserId};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Audit entry builder
// ---------------------------------------------------------------------------

/// Builder for constructing validated [`AuditEntry`] values.
///
/// # Examples
///
/// ```
/// use whisker_ledger::AuditEntryBuilder;
/// use whisker_types::{AuditAction, UserId};
///
/// let entry = AuditEntryBuilder::new(UserId::new(), AuditAction::Draw)
///     .amount(-10)
///     .metadata(serde_json::json!({ "pool": "standard" }))
///     .build();
///
/// assert!(entry.is_ok());
/// ```
#[derive(Debug)]
pub struct AuditEntryBuilder {
    user_id: UserId,
    action: AuditAction,
    amount: i64,
    essence: i64,
    reference_id: Option<Uuid>,
    metadata: serde_json::Value,
    created_at: Option<DateTime<Utc>>,
}

impl AuditEntryBuilder {
    /// Start building an entry for `user_id`.
    pub const fn new(user_id: UserId, action: AuditAction) -> Self {
        Self {
            user_id,
            action,
            amount: 0,
            essence: 0,
            reference_id: None,
            metadata: serde_json::Value::Null,
            created_at: None,
        }
    }

    /// Set the signed currency delta.
    #[must_use]
    pub const fn amount(mut self, amount: i64) -> Self {
        self.amount = amount;
        self
    }

    /// Set the essence delta.
    #[must_use]
    pub const fn essence(mut self, essence: i64) -> Self {
        self.essence = essence;
        self
    }

    /// Link the entry to a related record.
    #[must_use]
    pub fn reference(mut self, id: impl Into<Uuid>) -> Self {
        self.reference_id = Some(id.into());
        self
    }

    /// Attach free-form details.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Use a caller-supplied timestamp instead of the wall clock.
    #[must_use]
    pub const fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Validate inputs and produce an [`AuditEntry`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAmount`] if the currency delta has the
    /// wrong sign for the action.
    /// Returns [`LedgerError::NegativeEssence`] if the essence delta is
    /// negative.
    pub fn build(self) -> Result<AuditEntry, LedgerError> {
        if !amount_allowed(self.action, self.amount) {
            return Err(LedgerError::InvalidAmount {
                action: self.action,
                amount: self.amount,
            });
        }
        if self.essence < 0 {
            return Err(LedgerError::NegativeEssence {
                essence: self.essence,
            });
        }

        Ok(AuditEntry {
            id: AuditEntryId::new(),
            user_id: self.user_id,
            action: self.action,
            amount: self.amount,
            essence: self.essence,
            reference_id: self.reference_id,
            metadata: self.metadata,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

/// Whether `amount` satisfies the sign contract for `action`.
const fn amount_allowed(action: AuditAction, amount: i64) -> bool {
    match action {
        AuditAction::Accrual => amount > 0,
        AuditAction::Draw | AuditAction::Purchase | AuditAction::Care | AuditAction::TierUpgrade => {
            amount <= 0
        }
        AuditAction::Acquire
        | AuditAction::Duplicate
        | AuditAction::DuplicateAtMax
        | AuditAction::LevelUp
        | AuditAction::Decay
        | AuditAction::Released
        | AuditAction::ItemGrant
        | AuditAction::Equip
        | AuditAction::Grant => amount == 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_valid_entry() {
        let user = UserId::new();
        let reference = Uuid::now_v7();
        let result = AuditEntryBuilder::new(user, AuditAction::Purchase)
            .amount(-250)
            .reference(reference)
            .build();

        assert!(result.is_ok());
        if let Ok(e) = result {
            assert_eq!(e.user_id, user);
            assert_eq!(e.action, AuditAction::Purchase);
            assert_eq!(e.amount, -250);
            assert_eq!(e.reference_id, Some(reference));
        }
    }

    #[test]
    fn accrual_must_be_positive() {
        let zero = AuditEntryBuilder::new(UserId::new(), AuditAction::Accrual).build();
        assert!(matches!(zero, Err(LedgerError::InvalidAmount { amount: 0, .. })));

        let negative = AuditEntryBuilder::new(UserId::new(), AuditAction::Accrual)
            .amount(-1)
            .build();
        assert!(negative.is_err());
    }

    #[test]
    fn spending_cannot_credit() {
        let result = AuditEntryBuilder::new(UserId::new(), AuditAction::Draw)
            .amount(5)
            .build();
        assert!(matches!(result, Err(LedgerError::InvalidAmount { .. })));
    }

    #[test]
    fn free_draw_is_allowed() {
        let result = AuditEntryBuilder::new(UserId::new(), AuditAction::Draw).build();
        assert!(result.is_ok());
    }

    #[test]
    fn bookkeeping_actions_move_no_currency() {
        let result = AuditEntryBuilder::new(UserId::new(), AuditAction::LevelUp)
            .amount(1)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn negative_essence_rejected() {
        let result = AuditEntryBuilder::new(UserId::new(), AuditAction::DuplicateAtMax)
            .essence(-3)
            .build();
        assert!(matches!(result, Err(LedgerError::NegativeEssence { essence: -3 })));
    }

    #[test]
    fn explicit_timestamp_is_kept() {
        let at = Utc::now() - chrono::Duration::days(2);
        let result = AuditEntryBuilder::new(UserId::new(), AuditAction::Care).at(at).build();
        assert_eq!(result.ok().map(|e| e.created_at), Some(at));
    }

    #[test]
    fn currency_actions_agree_with_sign_contract() {
        // Every action that is allowed a non-zero amount must be flagged as
        // moving currency, and vice versa.
        let all = [
            AuditAction::Accrual,
            AuditAction::Draw,
            AuditAction::Purchase,
            AuditAction::Acquire,
            AuditAction::Duplicate,
            AuditAction::DuplicateAtMax,
            AuditAction::LevelUp,
            AuditAction::Care,
            AuditAction::Decay,
            AuditAction::Released,
            AuditAction::ItemGrant,
            AuditAction::Equip,
            AuditAction::TierUpgrade,
            AuditAction::Grant,
        ];
        for action in all {
            let non_zero_ok = amount_allowed(action, 1) || amount_allowed(action, -1);
            assert_eq!(non_zero_ok, action.moves_currency(), "{action}");
        }
    }
}
