//! Debit and credit notes
//!
//! A note corrects a reconciliation exception without touching the original
//! nota. Its signed amount only takes effect once the counterparty has
//! acknowledged it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, AdjustmentId, Currency, Entity, Money, MoneyError, NotaId};

use crate::error::BillingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NoteType {
    /// Shortfall: the debtor owes more than was paid
    Debit,
    /// Overpayment: the debtor is owed a refund
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdjustmentStatus {
    Draft,
    UnderReview,
    Approved,
    Rejected,
    Acknowledged,
}

impl AdjustmentStatus {
    /// Draft, UnderReview and Approved still await a decision
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            AdjustmentStatus::Draft | AdjustmentStatus::UnderReview | AdjustmentStatus::Approved
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustmentStatusChange {
    pub from: AdjustmentStatus,
    pub to: AdjustmentStatus,
    pub actor_email: String,
    pub reason: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebitCreditNote {
    pub id: AdjustmentId,
    pub note_number: String,
    pub original_nota_id: NotaId,
    pub note_type: NoteType,
    /// Positive for a debit, negative for a credit
    pub adjustment_amount: Money,
    pub reason: String,
    pub status: AdjustmentStatus,
    pub history: Vec<AdjustmentStatusChange>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for DebitCreditNote {
    type Id = AdjustmentId;
    const KIND: &'static str = "DebitCreditNote";

    fn id(&self) -> AdjustmentId {
        self.id
    }
}

impl DebitCreditNote {
    /// Drafts a note sized to a reconciliation residual
    ///
    /// `residual` is expected minus received: a positive residual is a
    /// shortfall and becomes a debit, a negative one becomes a credit.
    pub fn for_residual(
        original_nota_id: NotaId,
        residual: Money,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<Self, BillingError> {
        if residual.is_zero() {
            return Err(BillingError::NothingToAdjust);
        }

        let note_type = if residual.is_positive() {
            NoteType::Debit
        } else {
            NoteType::Credit
        };

        let now = Utc::now();
        let id = AdjustmentId::new_v7();
        let prefix = match note_type {
            NoteType::Debit => "DN",
            NoteType::Credit => "CN",
        };

        Ok(Self {
            id,
            note_number: format!("{}-{}", prefix, &id.as_uuid().simple().to_string()[..12]),
            original_nota_id,
            note_type,
            adjustment_amount: residual,
            reason: reason.into(),
            status: AdjustmentStatus::Draft,
            history: Vec::new(),
            created_by: actor.email.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Sum of acknowledged notes for one nota
    pub fn acknowledged_total(
        nota_id: NotaId,
        currency: Currency,
        notes: &[DebitCreditNote],
    ) -> Result<Money, MoneyError> {
        Money::sum(
            currency,
            notes
                .iter()
                .filter(|n| n.original_nota_id == nota_id)
                .filter(|n| n.status == AdjustmentStatus::Acknowledged)
                .map(|n| &n.adjustment_amount),
        )
    }

    pub fn submit(&mut self, actor: &Actor) -> Result<AdjustmentStatus, BillingError> {
        self.step(AdjustmentStatus::Draft, AdjustmentStatus::UnderReview, actor, None)
    }

    pub fn approve(&mut self, actor: &Actor) -> Result<AdjustmentStatus, BillingError> {
        self.step(AdjustmentStatus::UnderReview, AdjustmentStatus::Approved, actor, None)
    }

    pub fn reject(
        &mut self,
        reason: impl Into<String>,
        actor: &Actor,
    ) -> Result<AdjustmentStatus, BillingError> {
        let reason = reason.into();
        if reason.trim().is_empty() {
            return Err(BillingError::invalid(
                "DebitCreditNote",
                self.status,
                "rejection requires a reason",
            ));
        }
        self.step(
            AdjustmentStatus::UnderReview,
            AdjustmentStatus::Rejected,
            actor,
            Some(reason),
        )
    }

    pub fn acknowledge(&mut self, actor: &Actor) -> Result<AdjustmentStatus, BillingError> {
        self.step(AdjustmentStatus::Approved, AdjustmentStatus::Acknowledged, actor, None)
    }

    fn step(
        &mut self,
        expected: AdjustmentStatus,
        to: AdjustmentStatus,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<AdjustmentStatus, BillingError> {
        if self.status != expected {
            return Err(BillingError::invalid(
                "DebitCreditNote",
                self.status,
                format!("expected {:?} to move to {:?}", expected, to),
            ));
        }

        let from = self.status;
        let now = Utc::now();
        self.history.push(AdjustmentStatusChange {
            from,
            to,
            actor_email: actor.email.clone(),
            reason,
            at: now,
        });
        self.status = to;
        self.updated_at = now;
        Ok(from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Role;
    use rust_decimal_macros::dec;

    fn actor(role: Role) -> Actor {
        Actor::new("someone@reinsure.test", role)
    }

    #[test]
    fn test_sign_follows_direction() {
        let nota = NotaId::new();
        let debit = DebitCreditNote::for_residual(
            nota,
            Money::idr(dec!(1000000)),
            "short",
            &actor(Role::Finance),
        )
        .unwrap();
        assert_eq!(debit.note_type, NoteType::Debit);
        assert!(debit.note_number.starts_with("DN-"));

        let credit = DebitCreditNote::for_residual(
            nota,
            Money::idr(dec!(-250000)),
            "over",
            &actor(Role::Finance),
        )
        .unwrap();
        assert_eq!(credit.note_type, NoteType::Credit);
        assert!(credit.adjustment_amount.is_negative());
    }

    #[test]
    fn test_zero_residual_is_not_adjustable() {
        let result = DebitCreditNote::for_residual(
            NotaId::new(),
            Money::idr(dec!(0)),
            "none",
            &actor(Role::Finance),
        );
        assert_eq!(result.unwrap_err(), BillingError::NothingToAdjust);
    }

    #[test]
    fn test_full_path_to_acknowledged() {
        let mut note = DebitCreditNote::for_residual(
            NotaId::new(),
            Money::idr(dec!(1000000)),
            "short",
            &actor(Role::Finance),
        )
        .unwrap();

        assert!(note.acknowledge(&actor(Role::Counterparty)).is_err());
        note.submit(&actor(Role::Finance)).unwrap();
        note.approve(&actor(Role::Manager)).unwrap();
        note.acknowledge(&actor(Role::Counterparty)).unwrap();

        assert_eq!(note.status, AdjustmentStatus::Acknowledged);
        assert!(!note.status.is_open());
        assert_eq!(note.history.len(), 3);
    }

    #[test]
    fn test_reject_only_from_review() {
        let mut note = DebitCreditNote::for_residual(
            NotaId::new(),
            Money::idr(dec!(1000000)),
            "short",
            &actor(Role::Finance),
        )
        .unwrap();

        assert!(note.reject("no", &actor(Role::Manager)).is_err());
        note.submit(&actor(Role::Finance)).unwrap();
        assert!(note.reject("  ", &actor(Role::Manager)).is_err());
        note.reject("duplicate", &actor(Role::Manager)).unwrap();
        assert_eq!(note.status, AdjustmentStatus::Rejected);
    }

    #[test]
    fn test_acknowledged_total_ignores_open_notes() {
        let nota = NotaId::new();
        let mut acknowledged = DebitCreditNote::for_residual(
            nota,
            Money::idr(dec!(700000)),
            "short",
            &actor(Role::Finance),
        )
        .unwrap();
        acknowledged.status = AdjustmentStatus::Acknowledged;

        let pending = DebitCreditNote::for_residual(
            nota,
            Money::idr(dec!(300000)),
            "short",
            &actor(Role::Finance),
        )
        .unwrap();

        let total =
            DebitCreditNote::acknowledged_total(nota, Currency::IDR, &[acknowledged, pending])
                .unwrap();
        assert_eq!(total, Money::idr(dec!(700000)));
    }
}
