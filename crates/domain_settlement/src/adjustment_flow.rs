//! Debit and credit notes
//!
//! A note is opened against a reconciliation exception and sized to its
//! residual. Finance submits it, a manager reviews it and the counterparty
//! acknowledges it; only then does it change the nota's effective amount.

use tracing::{debug, info};

use core_kernel::{Actor, AdjustmentId, NotaId, Role};
use domain_billing::{AdjustmentStatus, BillingError, DebitCreditNote};

use crate::audit::AuditEntry;
use crate::error::WorkflowError;
use crate::notify::TemplatedEmail;
use crate::permissions::Action;
use crate::service::SettlementService;
use crate::store::find;

const MODULE: &str = "adjustment";

impl SettlementService {
    /// Opens a note for the nota's reconciliation residual
    ///
    /// A nota carries at most one open note; asking again returns it.
    pub async fn open_adjustment(
        &self,
        actor: &Actor,
        nota_id: NotaId,
        reason: &str,
    ) -> Result<DebitCreditNote, WorkflowError> {
        self.permit(actor, Action::AdjustmentOpen, MODULE, "Nota", nota_id).await?;
        let _lock = self.locks.acquire("nota", nota_id).await;

        let open = find(&*self.stores.adjustments, |n: &DebitCreditNote| {
            n.original_nota_id == nota_id && n.status.is_open()
        })
        .await?;
        if let Some(existing) = open.into_iter().next() {
            debug!(nota_id = %nota_id, note = %existing.note_number, "open adjustment already exists");
            return Ok(existing);
        }

        let nota = self.stores.notas.get(nota_id).await?;
        let item = self.derive_item(&nota).await?;
        let blocked = || {
            AuditEntry::blocked(Action::AdjustmentOpen, MODULE, "Nota", nota_id, actor)
                .with_reason(format!("residual {}", item.residual))
        };

        let exception = if item.awaiting_payment {
            Err(WorkflowError::gate(format!(
                "nothing received against {} yet",
                nota.nota_number
            )))
        } else if item.has_exception {
            Ok(())
        } else {
            Err(WorkflowError::gate(format!(
                "reconciliation of {} has no exception",
                nota.nota_number
            )))
        };
        self.guard(exception, blocked).await?;

        let draft = self
            .guard(
                DebitCreditNote::for_residual(nota_id, item.residual, reason, actor)
                    .map_err(WorkflowError::from),
                blocked,
            )
            .await?;
        let note = self.stores.adjustments.create(draft).await?.into_inner();

        self.audit
            .record(
                AuditEntry::allowed(Action::AdjustmentOpen, MODULE, "DebitCreditNote", note.id, actor)
                    .with_change(Option::<AdjustmentStatus>::None, note.status)
                    .with_reason(reason),
            )
            .await;
        info!(
            note = %note.note_number,
            nota = %nota.nota_number,
            amount = %note.adjustment_amount,
            "adjustment opened"
        );
        self.email_adjustment(&note, None, Role::Finance).await;

        Ok(note)
    }

    pub async fn submit_adjustment(
        &self,
        actor: &Actor,
        adjustment_id: AdjustmentId,
    ) -> Result<DebitCreditNote, WorkflowError> {
        self.permit(actor, Action::AdjustmentSubmit, MODULE, "DebitCreditNote", adjustment_id)
            .await?;
        self.transition_adjustment(actor, Action::AdjustmentSubmit, adjustment_id, None, |note| {
            note.submit(actor)
        })
        .await
    }

    /// Approves or rejects a note under review; rejection needs a reason
    pub async fn review_adjustment(
        &self,
        actor: &Actor,
        adjustment_id: AdjustmentId,
        approve: bool,
        reason: Option<String>,
    ) -> Result<DebitCreditNote, WorkflowError> {
        self.permit(actor, Action::AdjustmentReview, MODULE, "DebitCreditNote", adjustment_id)
            .await?;
        let why = reason.clone();
        self.transition_adjustment(actor, Action::AdjustmentReview, adjustment_id, why, |note| {
            if approve {
                note.approve(actor)
            } else {
                note.reject(reason.unwrap_or_default(), actor)
            }
        })
        .await
    }

    /// Counterparty acknowledgement; the note now counts toward the nota
    pub async fn acknowledge_adjustment(
        &self,
        actor: &Actor,
        adjustment_id: AdjustmentId,
    ) -> Result<DebitCreditNote, WorkflowError> {
        self.permit(actor, Action::AdjustmentAcknowledge, MODULE, "DebitCreditNote", adjustment_id)
            .await?;
        let note = self
            .transition_adjustment(actor, Action::AdjustmentAcknowledge, adjustment_id, None, |note| {
                note.acknowledge(actor)
            })
            .await?;

        let _lock = self.locks.acquire("nota", note.original_nota_id).await;
        let nota = self.stores.notas.get(note.original_nota_id).await?;
        self.refresh_reconciliation(&nota).await?;
        Ok(note)
    }

    /// Notes raised against one nota, oldest first
    pub async fn adjustments_for(&self, nota_id: NotaId) -> Result<Vec<DebitCreditNote>, WorkflowError> {
        let mut notes = find(&*self.stores.adjustments, |n: &DebitCreditNote| n.original_nota_id == nota_id)
            .await?;
        notes.sort_by_key(|n| n.created_at);
        Ok(notes)
    }

    async fn transition_adjustment<F>(
        &self,
        actor: &Actor,
        action: Action,
        adjustment_id: AdjustmentId,
        reason: Option<String>,
        transition: F,
    ) -> Result<DebitCreditNote, WorkflowError>
    where
        F: FnOnce(&mut DebitCreditNote) -> Result<AdjustmentStatus, BillingError>,
    {
        let nota_id = self.stores.adjustments.get(adjustment_id).await?.original_nota_id;
        let _lock = self.locks.acquire("nota", nota_id).await;

        let current = self.stores.adjustments.get(adjustment_id).await?;
        let mut note = current.entity.clone();
        let from = self
            .guard(transition(&mut note).map_err(WorkflowError::from), || {
                AuditEntry::blocked(action, MODULE, "DebitCreditNote", adjustment_id, actor)
                    .with_change(current.status, Option::<AdjustmentStatus>::None)
            })
            .await?;
        let updated = self.stores.adjustments.update(note, current.version).await?;

        let mut entry = AuditEntry::allowed(action, MODULE, "DebitCreditNote", adjustment_id, actor)
            .with_change(from, updated.status);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        self.audit.record(entry).await;
        info!(
            note = %updated.note_number,
            from = ?from,
            to = ?updated.status,
            actor = %actor.email,
            "adjustment transitioned"
        );

        let audience = match updated.status {
            AdjustmentStatus::UnderReview => Role::Manager,
            AdjustmentStatus::Approved => Role::Counterparty,
            _ => Role::Finance,
        };
        self.email_adjustment(&updated, Some(from), audience).await;

        Ok(updated.into_inner())
    }

    async fn email_adjustment(&self, note: &DebitCreditNote, from: Option<AdjustmentStatus>, audience: Role) {
        let from = from.map(|s| format!("{:?}", s)).unwrap_or_else(|| "None".to_string());
        self.notifier
            .email(
                TemplatedEmail::transition("Adjustment", &from, &format!("{:?}", note.status), audience)
                    .var("note_number", &note.note_number)
                    .var("note_type", format!("{:?}", note.note_type))
                    .var("amount", note.adjustment_amount),
            )
            .await;
    }
}
