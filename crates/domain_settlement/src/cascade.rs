//! The settlement cascade
//!
//! One saga settles a nota, whichever of the three triggers started it:
//!
//! 1. invoice marked paid
//! 2. settlement payment created, unless a payment already references the
//!    invoice or the nota
//! 3. reconciliation record closed when within tolerance, refreshed
//!    otherwise
//! 4. received payments distributed over the approved debtors
//! 5. approved debtors marked paid and closed
//! 6. batch mirrored to `Paid`
//! 7. claim behind a claim nota settled
//! 8. nota marked `Paid`
//!
//! The nota moves last. Callers hold the nota lock.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use core_kernel::{Actor, BatchId, DebtorId, IdempotencyKey, Money, NotaId, Role, Versioned};
use domain_batch::{AcceptedDebtor, BatchStatus, Debtor, UnderwritingStatus};
use domain_billing::{
    distribute, DebitCreditNote, Invoice, Nota, NotaReference, NotaStatus, NotaType, Payment,
    ReconciliationItem, ReconciliationRecord,
};

use crate::audit::AuditEntry;
use crate::error::WorkflowError;
use crate::notify::{Severity, TemplatedEmail};
use crate::permissions::Action;
use crate::saga::{Step, StepOutcome};
use crate::service::SettlementService;
use crate::store::{find, modify};

const MODULE: &str = "settlement";

/// What started a settlement cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementTrigger {
    /// A nota was advanced to `Paid`
    NotaAdvance,
    /// A matched payment covered the invoice
    Match,
    /// An operator closed the reconciliation item
    ReconciliationClose,
}

impl SettlementTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementTrigger::NotaAdvance => "nota_advance",
            SettlementTrigger::Match => "match",
            SettlementTrigger::ReconciliationClose => "reconciliation_close",
        }
    }

    fn action(&self) -> Action {
        match self {
            SettlementTrigger::NotaAdvance => Action::NotaAdvance,
            SettlementTrigger::Match => Action::PaymentMatch,
            SettlementTrigger::ReconciliationClose => Action::ReconciliationClose,
        }
    }
}

pub(crate) fn invoice_key(nota_id: NotaId) -> IdempotencyKey {
    IdempotencyKey::new("invoice", nota_id)
}

impl SettlementService {
    /// Runs the settlement cascade for a `Confirmed` (or already `Paid`) nota
    pub(crate) async fn settle_nota(
        &self,
        actor: &Actor,
        nota_id: NotaId,
        trigger: SettlementTrigger,
        payment_reference: Option<String>,
    ) -> Result<Nota, WorkflowError> {
        let current = self.stores.notas.get(nota_id).await?;
        let settleable = match current.status {
            NotaStatus::Confirmed | NotaStatus::Paid => Ok(()),
            other => Err(WorkflowError::invalid_state(
                "Nota",
                other,
                "only Confirmed notas can be paid",
            )),
        };
        self.guard(settleable, || {
            AuditEntry::blocked(trigger.action(), MODULE, "Nota", nota_id, actor)
                .with_change(current.status, NotaStatus::Paid)
                .with_reason(trigger.as_str())
        })
        .await?;

        let nota = &current.entity;
        let reference = payment_reference.as_deref();
        let steps = [
            Step::new("invoice_paid", move || Box::pin(self.invoice_paid_step(nota))),
            Step::new("settlement_payment", move || {
                Box::pin(self.settlement_payment_step(actor, nota, reference))
            }),
            Step::new("reconciliation_closed", move || {
                Box::pin(self.close_record_step(actor, nota))
            }),
            Step::new("payments_distributed", move || {
                Box::pin(self.distribute_received_step(nota))
            }),
            Step::new("debtors_settled", move || Box::pin(self.settle_debtors_step(nota))),
            Step::new("batch_paid", move || Box::pin(self.batch_paid_step(actor, nota))),
            Step::new("claim_settled", move || Box::pin(self.settle_claim_step(nota))),
            Step::new("nota_paid", move || {
                Box::pin(self.nota_paid_step(actor, nota_id, reference))
            }),
        ];
        let report = self.saga.run("settlement", &steps).await?;

        let settled = self.stores.notas.get(nota_id).await?.into_inner();
        if report.applied.contains(&"nota_paid") {
            self.announce_nota(
                actor,
                trigger.action(),
                current.status,
                &settled,
                Some(format!("settled via {}", trigger.as_str())),
            )
            .await;
            self.notifier
                .notify(
                    "Nota settled",
                    format!("{} is paid ({})", settled.nota_number, settled.amount()),
                    Severity::Info,
                    MODULE,
                    nota_id,
                    Role::Finance,
                )
                .await;
        } else {
            debug!(nota = %settled.nota_number, trigger = trigger.as_str(), "settlement replay, nota already paid");
        }
        info!(
            nota = %settled.nota_number,
            trigger = trigger.as_str(),
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "settlement cascade finished"
        );

        Ok(settled)
    }

    /// The nota's invoice, issued now if an earlier run stopped short of it
    pub(crate) async fn invoice_for(&self, nota: &Nota) -> Result<Versioned<Invoice>, WorkflowError> {
        let invoice = Invoice::issue(
            nota.id,
            nota.contract_id,
            nota.reference.batch_id(),
            nota.amount(),
        );
        Ok(self
            .stores
            .invoices
            .create_once(&invoice_key(nota.id), invoice)
            .await?
            .into_inner())
    }

    /// The persisted reconciliation record of a batch nota
    pub(crate) async fn record_for(
        &self,
        nota_id: NotaId,
    ) -> Result<Option<ReconciliationRecord>, WorkflowError> {
        match self.stores.reconciliations.get(nota_id).await {
            Ok(record) => Ok(Some(record.into_inner())),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Derives the reconciliation view of one nota from current state
    pub(crate) async fn derive_item(&self, nota: &Nota) -> Result<ReconciliationItem, WorkflowError> {
        let nota_id = nota.id;
        let contract_id = nota.contract_id;

        let invoice = find(&*self.stores.invoices, |i: &Invoice| i.nota_id == nota_id)
            .await?
            .into_iter()
            .next();
        let payments = find(&*self.stores.payments, |p: &Payment| p.contract_id == contract_id).await?;
        let adjustments = find(&*self.stores.adjustments, |n: &DebitCreditNote| {
            n.original_nota_id == nota_id
        })
        .await?;
        let record = self.record_for(nota_id).await?;

        Ok(ReconciliationItem::derive(
            nota,
            invoice.as_ref(),
            &payments,
            &adjustments,
            record.as_ref(),
            &self.policy,
        )?)
    }

    /// Stores the freshly derived status on the nota's reconciliation record
    pub(crate) async fn refresh_reconciliation(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        if nota.nota_type != NotaType::Batch || self.record_for(nota.id).await?.is_none() {
            return Ok(StepOutcome::Skipped);
        }

        let item = self.derive_item(nota).await?;
        let (_, changed) = modify(
            &*self.stores.reconciliations,
            nota.id,
            self.config.max_step_retries,
            |record| Ok(record.refresh(item.status)),
        )
        .await?;
        Ok(outcome(changed))
    }

    /// Spreads one received payment over the approved debtors of a batch
    ///
    /// Weights are the accepted premium snapshots in debtor id order, so a
    /// replay computes the same shares. Each debtor applies a payment once.
    pub(crate) async fn distribute_payment(
        &self,
        batch_id: BatchId,
        payment: &Payment,
    ) -> Result<StepOutcome, WorkflowError> {
        let approved: Vec<Debtor> = find(&*self.stores.debtors, |d: &Debtor| {
            d.batch_id == batch_id && d.is_active && d.underwriting_status == UnderwritingStatus::Approved
        })
        .await?;
        if approved.iter().all(|d| d.applied_payments.contains(&payment.id)) && !approved.is_empty() {
            return Ok(StepOutcome::Skipped);
        }

        let snapshots =
            find(&*self.stores.accepted_debtors, |s: &AcceptedDebtor| s.batch_id == batch_id).await?;
        let mut weights: Vec<(DebtorId, Money)> = snapshots
            .iter()
            .filter(|s| approved.iter().any(|d| d.id == s.debtor_id))
            .map(|s| (s.debtor_id, s.premium_amount))
            .collect();
        weights.sort_by_key(|(id, _)| *id.as_uuid());

        let shares = distribute(&payment.amount, &weights)?;
        let mut applied = false;
        for share in shares {
            let (_, changed) = modify(
                &*self.stores.debtors,
                share.debtor_id,
                self.config.max_step_retries,
                |debtor| Ok(debtor.apply_payment(payment.id, share.share)?),
            )
            .await?;
            applied |= changed;
        }
        Ok(outcome(applied))
    }

    async fn invoice_paid_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        let invoice = self.invoice_for(nota).await?;
        let (_, changed) = modify(
            &*self.stores.invoices,
            invoice.id,
            self.config.max_step_retries,
            |invoice| Ok(invoice.mark_paid()),
        )
        .await?;
        Ok(outcome(changed))
    }

    async fn settlement_payment_step(
        &self,
        actor: &Actor,
        nota: &Nota,
        reference: Option<&str>,
    ) -> Result<StepOutcome, WorkflowError> {
        let invoice = self.invoice_for(nota).await?;
        let invoice_id = invoice.id;
        let nota_id = nota.id;

        let existing = find(&*self.stores.payments, |p: &Payment| {
            p.invoice_id == Some(invoice_id) || p.nota_id == Some(nota_id)
        })
        .await?;
        if !existing.is_empty() {
            return Ok(StepOutcome::Skipped);
        }

        let payment = Payment::settlement(
            nota.contract_id,
            invoice_id,
            nota_id,
            invoice.total_amount,
            reference.map(str::to_string),
            actor,
        );
        let created = self
            .stores
            .payments
            .create_once(&IdempotencyKey::new("settlement", invoice_id), payment)
            .await?;
        Ok(outcome(created.was_created()))
    }

    async fn close_record_step(&self, actor: &Actor, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        if nota.nota_type != NotaType::Batch {
            return Ok(StepOutcome::Skipped);
        }
        self.stores
            .reconciliations
            .create_once(&IdempotencyKey::new("reconciliation", nota.id), ReconciliationRecord::open(nota))
            .await?;

        let item = self.derive_item(nota).await?;
        let within = self.policy.is_within(&item.residual, &item.nota_amount)?;
        let (record, changed) = modify(
            &*self.stores.reconciliations,
            nota.id,
            self.config.max_step_retries,
            |record| {
                if within {
                    Ok(record.close(actor))
                } else {
                    Ok(record.refresh(item.status))
                }
            },
        )
        .await?;

        if changed && record.is_closed() {
            self.audit
                .record(
                    AuditEntry::allowed(Action::ReconciliationClose, MODULE, "ReconciliationRecord", nota.id, actor)
                        .with_change(item.status, record.status)
                        .with_reason(format!("residual {}", item.residual)),
                )
                .await;
        } else if !within {
            warn!(nota = %nota.nota_number, residual = %item.residual, "settled outside tolerance, reconciliation left open");
        }
        Ok(outcome(changed))
    }

    async fn distribute_received_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        let Some(batch_id) = nota.reference.batch_id() else {
            return Ok(StepOutcome::Skipped);
        };
        let invoice_id = self.invoice_for(nota).await?.id;
        let nota_id = nota.id;
        let currency = nota.amount().currency();

        let received = find(&*self.stores.payments, |p: &Payment| {
            p.counts_as_received() && (p.nota_id == Some(nota_id) || p.invoice_id == Some(invoice_id))
        })
        .await?;

        let mut applied = false;
        for payment in received {
            if payment.amount.currency() != currency {
                warn!(payment_id = %payment.id, "payment currency differs from nota, not distributed");
                continue;
            }
            applied |= self.distribute_payment(batch_id, &payment).await? == StepOutcome::Applied;
        }
        Ok(outcome(applied))
    }

    async fn settle_debtors_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        let Some(batch_id) = nota.reference.batch_id() else {
            return Ok(StepOutcome::Skipped);
        };
        let unsettled = find(&*self.stores.debtors, |d: &Debtor| {
            d.batch_id == batch_id
                && d.is_active
                && d.underwriting_status == UnderwritingStatus::Approved
                && !d.is_settled()
        })
        .await?;
        if unsettled.is_empty() {
            return Ok(StepOutcome::Skipped);
        }

        for debtor in unsettled {
            modify(&*self.stores.debtors, debtor.id, self.config.max_step_retries, |d| {
                if d.is_settled() {
                    return Ok(false);
                }
                d.mark_settled(BatchStatus::Paid);
                Ok(true)
            })
            .await?;
        }
        Ok(StepOutcome::Applied)
    }

    async fn batch_paid_step(&self, actor: &Actor, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        match nota.reference {
            NotaReference::Batch(batch_id) if nota.nota_type == NotaType::Batch => {
                self.mirror_batch(actor, batch_id, BatchStatus::Paid).await
            }
            _ => Ok(StepOutcome::Skipped),
        }
    }

    async fn settle_claim_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        let Some(claim_id) = nota.reference.claim_id() else {
            return Ok(StepOutcome::Skipped);
        };
        let (_, changed) = modify(&*self.stores.claims, claim_id, self.config.max_step_retries, |claim| {
            Ok(claim.settle()?)
        })
        .await?;
        Ok(outcome(changed))
    }

    async fn nota_paid_step(
        &self,
        actor: &Actor,
        nota_id: NotaId,
        reference: Option<&str>,
    ) -> Result<StepOutcome, WorkflowError> {
        let (_, changed) = modify(&*self.stores.notas, nota_id, self.config.max_step_retries, |nota| {
            Ok(nota.mark_paid(actor, reference.map(str::to_string))?)
        })
        .await?;
        Ok(outcome(changed))
    }

    /// Audit, log and email a nota status change
    pub(crate) async fn announce_nota(
        &self,
        actor: &Actor,
        action: Action,
        from: NotaStatus,
        nota: &Nota,
        reason: Option<String>,
    ) {
        let mut entry = AuditEntry::allowed(action, MODULE, "Nota", nota.id, actor)
            .with_change(from, nota.status);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        self.audit.record(entry).await;

        info!(
            nota = %nota.nota_number,
            from = from.as_str(),
            to = nota.status.as_str(),
            actor = %actor.email,
            "nota transitioned"
        );

        let audience = match nota.status {
            NotaStatus::Draft | NotaStatus::Confirmed => Role::Finance,
            NotaStatus::Issued | NotaStatus::Paid => Role::BranchOperator,
        };
        let mut email = TemplatedEmail::transition("Nota", from.as_str(), nota.status.as_str(), audience)
            .var("nota_number", &nota.nota_number)
            .var("amount", nota.amount());
        if let Some(reference) = &nota.payment_reference {
            email = email.var("payment_reference", reference);
        }
        self.notifier.email(email).await;
    }
}

fn outcome(changed: bool) -> StepOutcome {
    if changed {
        StepOutcome::Applied
    } else {
        StepOutcome::Skipped
    }
}
