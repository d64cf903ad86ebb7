//! Nota lifecycle
//!
//! `Draft -> Issued -> Confirmed -> Paid`. Each step is a saga: issuing
//! creates the invoice and reconciliation record, confirming creates the
//! payment intent, paying runs the settlement cascade. Batch notas mirror
//! every step onto their batch.

use chrono::{Duration, Utc};
use tracing::{debug, info};

use core_kernel::{Actor, BatchId, IdempotencyKey, Money, NotaId, Role};
use domain_batch::{Batch, BatchStatus, Debtor, UnderwritingStatus};
use domain_billing::{
    Invoice, Nota, NotaReference, NotaStatus, NotaType, PaymentIntent, PaymentType,
    ReconciliationRecord,
};

use crate::audit::AuditEntry;
use crate::cascade::SettlementTrigger;
use crate::error::WorkflowError;
use crate::notify::Severity;
use crate::permissions::Action;
use crate::saga::{Step, StepOutcome};
use crate::service::SettlementService;
use crate::store::{find, modify};

const MODULE: &str = "nota";

/// Final premium of a batch that may be billed
///
/// Raw upload totals are never billed.
fn billable_premium(batch: &Batch) -> Result<Money, WorkflowError> {
    if !batch.status.has_reached(BatchStatus::Approved) {
        return Err(WorkflowError::invalid_state(
            "Batch",
            batch.status,
            "notas are raised for approved batches only",
        ));
    }
    batch.ensure_ready_for_nota()?;
    let (_, premium) = batch.final_amounts()?;
    Ok(premium)
}

fn step_outcome(changed: bool) -> StepOutcome {
    if changed {
        StepOutcome::Applied
    } else {
        StepOutcome::Skipped
    }
}

impl SettlementService {
    /// Raises the batch nota of an approved, fully reviewed batch
    ///
    /// The amount is the batch's final premium. Calling this again returns
    /// the nota raised the first time.
    pub async fn create_batch_nota(&self, actor: &Actor, batch_id: BatchId) -> Result<Nota, WorkflowError> {
        self.permit(actor, Action::NotaCreate, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let batch = self.stores.batches.get(batch_id).await?;
        let premium = self
            .guard(billable_premium(&batch), || {
                AuditEntry::blocked(Action::NotaCreate, MODULE, "Batch", batch_id, actor)
            })
            .await?;

        let draft = Nota::draft(
            NotaType::Batch,
            NotaReference::Batch(batch_id),
            batch.contract_id,
            premium,
            actor,
        )?;
        let created = self
            .stores
            .notas
            .create_once(&IdempotencyKey::new("batch-nota", batch_id), draft)
            .await?;

        if !created.was_created() {
            let nota = created.into_inner().into_inner();
            debug!(batch_id = %batch_id, nota = %nota.nota_number, "batch nota already raised");
            return Ok(nota);
        }

        let nota = created.into_inner().into_inner();
        self.audit
            .record(
                AuditEntry::allowed(Action::NotaCreate, MODULE, "Nota", nota.id, actor)
                    .with_change(Option::<NotaStatus>::None, nota.status)
                    .with_reason(format!("batch {}", batch.batch_number)),
            )
            .await;
        info!(nota = %nota.nota_number, batch_id = %batch_id, amount = %nota.amount(), "batch nota raised");
        self.notifier
            .notify(
                "Nota drafted",
                format!("{} for {} ({})", nota.nota_number, batch.batch_number, nota.amount()),
                Severity::Info,
                MODULE,
                nota.id,
                Role::Finance,
            )
            .await;

        Ok(nota)
    }

    /// Moves a nota to its next state
    ///
    /// `payment_reference` is kept when the nota becomes `Paid`.
    pub async fn advance_nota(
        &self,
        actor: &Actor,
        nota_id: NotaId,
        payment_reference: Option<String>,
    ) -> Result<Nota, WorkflowError> {
        self.permit(actor, Action::NotaAdvance, MODULE, "Nota", nota_id).await?;
        let _lock = self.locks.acquire("nota", nota_id).await;

        let current = self.stores.notas.get(nota_id).await?;
        let next = self
            .guard(
                current.status.successor().ok_or_else(|| {
                    WorkflowError::invalid_state("Nota", current.status, "no successor state")
                }),
                || AuditEntry::blocked(Action::NotaAdvance, MODULE, "Nota", nota_id, actor),
            )
            .await?;

        match next {
            NotaStatus::Draft => Err(WorkflowError::invalid_state(
                "Nota",
                current.status,
                "cannot return to Draft",
            )),
            NotaStatus::Issued => self.issue_nota(actor, &current).await,
            NotaStatus::Confirmed => self.confirm_nota(actor, &current).await,
            NotaStatus::Paid => {
                self.settle_nota(actor, nota_id, SettlementTrigger::NotaAdvance, payment_reference)
                    .await
            }
        }
    }

    async fn issue_nota(&self, actor: &Actor, current: &Nota) -> Result<Nota, WorkflowError> {
        let batch_id = current.reference.batch_id().filter(|_| current.nota_type == NotaType::Batch);

        if let Some(batch_id) = batch_id {
            let batch = self.stores.batches.get(batch_id).await?;
            if !batch.status.has_reached(BatchStatus::NotaIssued) {
                let mut probe = batch.entity.clone();
                self.guard(
                    probe.advance_to(BatchStatus::NotaIssued, actor).map_err(WorkflowError::from),
                    || {
                        AuditEntry::blocked(Action::NotaAdvance, MODULE, "Nota", current.id, actor)
                            .with_change(current.status, NotaStatus::Issued)
                    },
                )
                .await?;
            }
        }

        let steps = [
            Step::new("invoice_issued", move || Box::pin(self.issue_invoice_step(current))),
            Step::new("reconciliation_opened", move || {
                Box::pin(self.open_record_step(current))
            }),
            Step::new("debtors_invoiced", move || Box::pin(self.invoice_debtors_step(batch_id))),
            Step::new("batch_nota_issued", move || {
                Box::pin(self.mirror_step(actor, batch_id, BatchStatus::NotaIssued))
            }),
            Step::new("nota_issued", move || {
                Box::pin(self.nota_step(actor, current.id, NotaStatus::Issued))
            }),
        ];
        self.finish_nota_saga(actor, current, "nota_issue", &steps, "nota_issued").await
    }

    async fn confirm_nota(&self, actor: &Actor, current: &Nota) -> Result<Nota, WorkflowError> {
        let batch_id = current.reference.batch_id().filter(|_| current.nota_type == NotaType::Batch);

        let steps = [
            Step::new("intent_created", move || Box::pin(self.create_intent_step(current))),
            Step::new("batch_branch_confirmed", move || {
                Box::pin(self.mirror_step(actor, batch_id, BatchStatus::BranchConfirmed))
            }),
            Step::new("nota_confirmed", move || {
                Box::pin(self.nota_step(actor, current.id, NotaStatus::Confirmed))
            }),
        ];
        self.finish_nota_saga(actor, current, "nota_confirm", &steps, "nota_confirmed").await
    }

    async fn finish_nota_saga(
        &self,
        actor: &Actor,
        current: &Nota,
        saga: &str,
        steps: &[Step<'_>],
        final_step: &'static str,
    ) -> Result<Nota, WorkflowError> {
        let report = self.saga.run(saga, steps).await?;
        let nota = self.stores.notas.get(current.id).await?.into_inner();
        if report.applied.contains(&final_step) {
            self.announce_nota(actor, Action::NotaAdvance, current.status, &nota, None).await;
        }
        Ok(nota)
    }

    async fn issue_invoice_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        let invoice = Invoice::issue(nota.id, nota.contract_id, nota.reference.batch_id(), nota.amount());
        let created = self
            .stores
            .invoices
            .create_once(&crate::cascade::invoice_key(nota.id), invoice)
            .await?;
        Ok(step_outcome(created.was_created()))
    }

    async fn open_record_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        if nota.nota_type != NotaType::Batch {
            return Ok(StepOutcome::Skipped);
        }
        let created = self
            .stores
            .reconciliations
            .create_once(&IdempotencyKey::new("reconciliation", nota.id), ReconciliationRecord::open(nota))
            .await?;
        Ok(step_outcome(created.was_created()))
    }

    async fn invoice_debtors_step(&self, batch_id: Option<BatchId>) -> Result<StepOutcome, WorkflowError> {
        let Some(batch_id) = batch_id else {
            return Ok(StepOutcome::Skipped);
        };
        let approved = find(&*self.stores.debtors, |d: &Debtor| {
            d.batch_id == batch_id && d.is_active && d.underwriting_status == UnderwritingStatus::Approved
        })
        .await?;

        let mut applied = false;
        for debtor in approved {
            let (_, changed) = modify(&*self.stores.debtors, debtor.id, self.config.max_step_retries, |d| {
                Ok(d.mark_invoiced(BatchStatus::NotaIssued))
            })
            .await?;
            applied |= changed;
        }
        Ok(step_outcome(applied))
    }

    async fn mirror_step(
        &self,
        actor: &Actor,
        batch_id: Option<BatchId>,
        target: BatchStatus,
    ) -> Result<StepOutcome, WorkflowError> {
        match batch_id {
            Some(batch_id) => self.mirror_batch(actor, batch_id, target).await,
            None => Ok(StepOutcome::Skipped),
        }
    }

    /// One intent per contract and nota, due after the payment term
    async fn create_intent_step(&self, nota: &Nota) -> Result<StepOutcome, WorkflowError> {
        let invoice = self.invoice_for(nota).await?;
        let planned_date = (Utc::now() + Duration::days(i64::from(self.config.payment_term_days))).date_naive();

        let intent = PaymentIntent::draft(
            nota.id,
            Some(invoice.id),
            nota.contract_id,
            PaymentType::Full,
            nota.amount(),
            planned_date,
        )?;
        let key = IdempotencyKey::new("intent", format!("{}:{}", nota.contract_id, nota.nota_number));
        let created = self.stores.intents.create_once(&key, intent).await?;
        Ok(step_outcome(created.was_created()))
    }

    async fn nota_step(
        &self,
        actor: &Actor,
        nota_id: NotaId,
        target: NotaStatus,
    ) -> Result<StepOutcome, WorkflowError> {
        let (_, changed) = modify(&*self.stores.notas, nota_id, self.config.max_step_retries, |nota| {
            if nota.status == target {
                return Ok(false);
            }
            if nota.status.successor() != Some(target) {
                return Err(WorkflowError::invalid_state(
                    "Nota",
                    nota.status,
                    format!("{} is not the next state", target.as_str()),
                ));
            }
            nota.advance(actor, None)?;
            Ok(true)
        })
        .await?;
        Ok(step_outcome(changed))
    }
}
