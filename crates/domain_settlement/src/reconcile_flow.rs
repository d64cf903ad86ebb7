//! Payment reconciliation
//!
//! Receipts are recorded unmatched and then tied to an approved payment
//! intent, automatically when an approved plan fits within tolerance or by
//! hand. Matching credits the invoice, spreads the money over the debtors
//! behind the batch and, once the invoice is covered or the item sits
//! within tolerance, settles the nota.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{Actor, ContractId, InvoiceId, Money, NotaId, PaymentId, PaymentIntentId, Role};
use domain_billing::{
    select_intent, ExceptionType, IntentStatus, Nota, NotaType, Payment, PaymentIntent,
    ReconciliationItem,
};

use crate::audit::AuditEntry;
use crate::cascade::SettlementTrigger;
use crate::error::WorkflowError;
use crate::notify::{Severity, TemplatedEmail};
use crate::permissions::Action;
use crate::saga::{Step, StepOutcome};
use crate::service::SettlementService;
use crate::store::{find, modify};

const MODULE: &str = "reconciliation";

/// A receipt as read from the bank statement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub contract_id: ContractId,
    pub invoice_id: Option<InvoiceId>,
    pub amount: Money,
    pub received_date: NaiveDate,
    pub bank_reference: Option<String>,
}

/// Result of an auto-match run
#[derive(Debug, Clone, Default, Serialize)]
pub struct AutoMatchReport {
    pub matched: Vec<PaymentId>,
    /// Payments with no approved intent within tolerance
    pub unmatched: Vec<PaymentId>,
}

impl SettlementService {
    /// Records a receipt and tries to match it right away
    pub async fn record_payment(&self, actor: &Actor, receipt: PaymentReceipt) -> Result<Payment, WorkflowError> {
        self.permit(actor, Action::PaymentRecord, MODULE, "Contract", receipt.contract_id)
            .await?;

        if let Some(invoice_id) = receipt.invoice_id {
            let invoice = self.stores.invoices.get(invoice_id).await?;
            let same_contract = if invoice.contract_id == receipt.contract_id {
                Ok(())
            } else {
                Err(WorkflowError::validation(format!(
                    "invoice {} belongs to another contract",
                    invoice.invoice_number
                )))
            };
            self.guard(same_contract, || {
                AuditEntry::blocked(Action::PaymentRecord, MODULE, "Invoice", invoice_id, actor)
            })
            .await?;
        }

        let mut payment = Payment::received(
            receipt.contract_id,
            receipt.invoice_id,
            receipt.amount,
            receipt.received_date,
            actor,
        )?;
        if let Some(reference) = receipt.bank_reference {
            payment = payment.with_reference(reference);
        }
        let payment = self.stores.payments.create(payment).await?.into_inner();

        self.audit
            .record(
                AuditEntry::allowed(Action::PaymentRecord, MODULE, "Payment", payment.id, actor)
                    .with_change(Option::<Money>::None, payment.amount),
            )
            .await;
        info!(payment_id = %payment.id, amount = %payment.amount, contract_id = %payment.contract_id, "payment recorded");

        if self.auto_match_one(actor, &payment).await? {
            return Ok(self.stores.payments.get(payment.id).await?.into_inner());
        }
        Ok(payment)
    }

    /// Tries to match every unmatched payment
    pub async fn run_auto_match(&self, actor: &Actor) -> Result<AutoMatchReport, WorkflowError> {
        self.permit(actor, Action::PaymentMatch, MODULE, "Payment", "*").await?;
        self.auto_match_where(actor, |_| true).await
    }

    /// Ties a payment to an approved intent chosen by an operator
    pub async fn match_payment(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        intent_id: PaymentIntentId,
    ) -> Result<Payment, WorkflowError> {
        self.permit(actor, Action::PaymentMatch, MODULE, "Payment", payment_id).await?;
        self.apply_match(actor, payment_id, intent_id).await
    }

    /// Closes a reconciliation item by hand
    ///
    /// Only residuals up to the close threshold may be closed; closing runs
    /// the settlement cascade.
    pub async fn close_reconciliation(
        &self,
        actor: &Actor,
        nota_id: NotaId,
    ) -> Result<ReconciliationItem, WorkflowError> {
        self.permit(actor, Action::ReconciliationClose, MODULE, "Nota", nota_id).await?;
        let _lock = self.locks.acquire("nota", nota_id).await;

        let nota = self.stores.notas.get(nota_id).await?;
        let blocked = || AuditEntry::blocked(Action::ReconciliationClose, MODULE, "Nota", nota_id, actor);

        let batch_nota = if nota.nota_type == NotaType::Batch {
            Ok(())
        } else {
            Err(WorkflowError::validation("only batch notas are reconciled"))
        };
        self.guard(batch_nota, blocked).await?;

        let item = self.derive_item(&nota).await?;
        self.guard(
            self.policy.ensure_closable(&item.residual).map_err(WorkflowError::from),
            blocked,
        )
        .await?;

        let settled = self
            .settle_nota(actor, nota_id, SettlementTrigger::ReconciliationClose, None)
            .await?;
        self.derive_item(&settled).await
    }

    /// Reconciliation view of one batch nota
    pub async fn reconciliation_for(&self, nota_id: NotaId) -> Result<ReconciliationItem, WorkflowError> {
        let nota = self.stores.notas.get(nota_id).await?;
        if nota.nota_type != NotaType::Batch {
            return Err(WorkflowError::validation("only batch notas are reconciled"));
        }
        self.derive_item(&nota).await
    }

    /// Reconciliation view of every batch nota
    pub async fn reconciliation_items(&self) -> Result<Vec<ReconciliationItem>, WorkflowError> {
        let notas = find(&*self.stores.notas, |n: &Nota| n.nota_type == NotaType::Batch).await?;
        let mut items = Vec::with_capacity(notas.len());
        for nota in &notas {
            items.push(self.derive_item(nota).await?);
        }
        Ok(items)
    }

    /// Sends a drafted intent for approval
    pub async fn submit_intent(&self, actor: &Actor, intent_id: PaymentIntentId) -> Result<PaymentIntent, WorkflowError> {
        self.permit(actor, Action::IntentSubmit, MODULE, "PaymentIntent", intent_id).await?;
        self.transition_intent(actor, Action::IntentSubmit, intent_id, |intent| intent.submit(actor))
            .await
    }

    /// Approves an intent and matches any waiting payment against it
    pub async fn approve_intent(&self, actor: &Actor, intent_id: PaymentIntentId) -> Result<PaymentIntent, WorkflowError> {
        self.permit(actor, Action::IntentApprove, MODULE, "PaymentIntent", intent_id).await?;
        let intent = self
            .transition_intent(actor, Action::IntentApprove, intent_id, |intent| intent.approve(actor))
            .await?;

        let contract_id = intent.contract_id;
        let report = self
            .auto_match_where(actor, move |p: &Payment| p.contract_id == contract_id)
            .await?;
        if !report.matched.is_empty() {
            return Ok(self.stores.intents.get(intent_id).await?.into_inner());
        }
        Ok(intent)
    }

    pub async fn reject_intent(
        &self,
        actor: &Actor,
        intent_id: PaymentIntentId,
        reason: &str,
    ) -> Result<PaymentIntent, WorkflowError> {
        self.permit(actor, Action::IntentReject, MODULE, "PaymentIntent", intent_id).await?;
        if reason.trim().is_empty() {
            let err = WorkflowError::validation("a reason is required to reject an intent");
            let entry = AuditEntry::blocked(Action::IntentReject, MODULE, "PaymentIntent", intent_id, actor);
            return Err(self.blocked(entry, err).await);
        }
        self.transition_intent(actor, Action::IntentReject, intent_id, |intent| {
            intent.reject(reason.trim(), actor)
        })
        .await
    }

    async fn transition_intent<F>(
        &self,
        actor: &Actor,
        action: Action,
        intent_id: PaymentIntentId,
        transition: F,
    ) -> Result<PaymentIntent, WorkflowError>
    where
        F: FnOnce(&mut PaymentIntent) -> Result<IntentStatus, domain_billing::BillingError>,
    {
        let nota_id = self.stores.intents.get(intent_id).await?.nota_id;
        let _lock = self.locks.acquire("nota", nota_id).await;

        let current = self.stores.intents.get(intent_id).await?;
        let mut intent = current.entity.clone();
        let from = self
            .guard(transition(&mut intent).map_err(WorkflowError::from), || {
                AuditEntry::blocked(action, MODULE, "PaymentIntent", intent_id, actor)
                    .with_change(current.status, Option::<IntentStatus>::None)
            })
            .await?;
        let updated = self.stores.intents.update(intent, current.version).await?;

        let mut entry = AuditEntry::allowed(action, MODULE, "PaymentIntent", intent_id, actor)
            .with_change(from, updated.status);
        if let Some(reason) = &updated.rejection_reason {
            entry = entry.with_reason(reason.clone());
        }
        self.audit.record(entry).await;
        info!(intent_id = %intent_id, from = ?from, to = ?updated.status, actor = %actor.email, "payment intent transitioned");

        let audience = match updated.status {
            IntentStatus::Submitted => Role::Manager,
            _ => Role::Finance,
        };
        self.notifier
            .email(
                TemplatedEmail::transition(
                    "PaymentIntent",
                    &format!("{:?}", from),
                    &format!("{:?}", updated.status),
                    audience,
                )
                .var("planned_amount", updated.planned_amount)
                .var("planned_date", updated.planned_date),
            )
            .await;

        Ok(updated.into_inner())
    }

    async fn auto_match_where<P>(&self, actor: &Actor, include: P) -> Result<AutoMatchReport, WorkflowError>
    where
        P: Fn(&Payment) -> bool + Send + Sync,
    {
        let unmatched = find(&*self.stores.payments, |p: &Payment| p.is_unmatched() && include(p)).await?;

        let mut report = AutoMatchReport::default();
        for payment in unmatched {
            if self.auto_match_one(actor, &payment).await? {
                report.matched.push(payment.id);
            } else {
                report.unmatched.push(payment.id);
            }
        }
        info!(matched = report.matched.len(), unmatched = report.unmatched.len(), "auto-match run");
        Ok(report)
    }

    /// Matches `payment` to the best approved intent within tolerance
    ///
    /// Returns `false` when no intent fits; tolerance differences are never
    /// corrected automatically.
    async fn auto_match_one(&self, actor: &Actor, payment: &Payment) -> Result<bool, WorkflowError> {
        let contract_id = payment.contract_id;
        let intents = find(&*self.stores.intents, |i: &PaymentIntent| {
            i.contract_id == contract_id && i.is_matchable()
        })
        .await?;

        let Some(intent) = select_intent(payment, &intents, &self.policy)? else {
            debug!(payment_id = %payment.id, "no approved intent within tolerance");
            return Ok(false);
        };

        match self.apply_match(actor, payment.id, intent.id).await {
            Ok(_) => Ok(true),
            Err(WorkflowError::Store(err)) => Err(WorkflowError::Store(err)),
            Err(err) => {
                debug!(payment_id = %payment.id, error = %err, "auto-match skipped");
                Ok(false)
            }
        }
    }

    /// The match saga; shared by manual and automatic matching
    async fn apply_match(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        intent_id: PaymentIntentId,
    ) -> Result<Payment, WorkflowError> {
        let nota_id = self.stores.intents.get(intent_id).await?.nota_id;
        let _lock = self.locks.acquire("nota", nota_id).await;

        let payment = self.stores.payments.get(payment_id).await?.into_inner();
        let intent = self.stores.intents.get(intent_id).await?.into_inner();
        let blocked = || {
            AuditEntry::blocked(Action::PaymentMatch, MODULE, "Payment", payment_id, actor)
                .with_change(payment.match_status, intent_id.to_string())
        };

        let replay = payment.intent_id == Some(intent_id);
        let checked = if replay {
            Ok(())
        } else if !payment.is_unmatched() {
            Err(WorkflowError::invalid_state("Payment", payment.match_status, "payment is already matched"))
        } else if !intent.is_matchable() {
            Err(WorkflowError::invalid_state("PaymentIntent", intent.status, "only approved intents can be matched"))
        } else if intent.contract_id != payment.contract_id {
            Err(WorkflowError::validation("payment and intent belong to different contracts"))
        } else if intent.planned_amount.currency() != payment.amount.currency() {
            Err(WorkflowError::gate(format!(
                "{:?} exception: payment in {} against a {} intent needs conversion first",
                ExceptionType::Fx,
                payment.amount.currency(),
                intent.planned_amount.currency()
            )))
        } else {
            Ok(())
        };
        self.guard(checked, blocked).await?;

        let exception = ExceptionType::classify(&payment, &intent, self.policy.tolerance_for(&intent.planned_amount)?)?;
        let nota = self.stores.notas.get(nota_id).await?.into_inner();

        let (payment, intent, nota) = (&payment, &intent, &nota);
        let steps = [
            Step::new("payment_matched", move || {
                Box::pin(self.match_payment_step(actor, payment_id, intent, exception))
            }),
            Step::new("intent_completed", move || Box::pin(self.complete_intent_step(intent_id))),
            Step::new("invoice_credited", move || Box::pin(self.credit_invoice_step(nota, payment))),
            Step::new("debtors_credited", move || Box::pin(self.credit_debtors_step(nota, payment))),
            Step::new("reconciliation_refreshed", move || Box::pin(self.refresh_reconciliation(nota))),
        ];
        let report = self.saga.run("payment_match", &steps).await?;

        let matched = self.stores.payments.get(payment_id).await?.into_inner();
        if report.applied.contains(&"payment_matched") {
            self.audit
                .record(
                    AuditEntry::allowed(Action::PaymentMatch, MODULE, "Payment", payment_id, actor)
                        .with_change(payment.match_status, matched.match_status)
                        .with_reason(format!("intent {} ({:?})", intent_id, exception)),
                )
                .await;
            info!(
                payment_id = %payment_id,
                intent_id = %intent_id,
                nota = %nota.nota_number,
                exception = ?exception,
                "payment matched"
            );
            if exception != ExceptionType::None {
                self.notifier
                    .notify(
                        "Payment exception",
                        format!("{} matched to {} with a {:?} exception", matched.amount, nota.nota_number, exception),
                        Severity::Warning,
                        MODULE,
                        payment_id,
                        Role::Finance,
                    )
                    .await;
            }
        }

        let covered = self.invoice_for(nota).await?.is_fully_covered();
        let item = self.derive_item(nota).await?;
        let within = nota.nota_type == NotaType::Batch && item.is_matched();
        if covered || within {
            self.settle_nota(actor, nota_id, SettlementTrigger::Match, matched.bank_reference.clone())
                .await?;
        }

        Ok(matched)
    }

    async fn match_payment_step(
        &self,
        actor: &Actor,
        payment_id: PaymentId,
        intent: &PaymentIntent,
        exception: ExceptionType,
    ) -> Result<StepOutcome, WorkflowError> {
        let (_, changed) = modify(&*self.stores.payments, payment_id, self.config.max_step_retries, |payment| {
            if payment.intent_id == Some(intent.id) {
                return Ok(false);
            }
            payment.match_to(intent, exception, actor)?;
            Ok(true)
        })
        .await?;
        Ok(if changed { StepOutcome::Applied } else { StepOutcome::Skipped })
    }

    async fn complete_intent_step(&self, intent_id: PaymentIntentId) -> Result<StepOutcome, WorkflowError> {
        let (_, changed) = modify(&*self.stores.intents, intent_id, self.config.max_step_retries, |intent| {
            if intent.status == IntentStatus::Completed {
                return Ok(false);
            }
            intent.complete()?;
            Ok(true)
        })
        .await?;
        Ok(if changed { StepOutcome::Applied } else { StepOutcome::Skipped })
    }

    async fn credit_invoice_step(&self, nota: &Nota, payment: &Payment) -> Result<StepOutcome, WorkflowError> {
        let invoice = self.invoice_for(nota).await?;
        let (_, changed) = modify(&*self.stores.invoices, invoice.id, self.config.max_step_retries, |invoice| {
            Ok(invoice.record_payment(payment.id, payment.amount)?)
        })
        .await?;
        Ok(if changed { StepOutcome::Applied } else { StepOutcome::Skipped })
    }

    async fn credit_debtors_step(&self, nota: &Nota, payment: &Payment) -> Result<StepOutcome, WorkflowError> {
        match nota.reference.batch_id() {
            Some(batch_id) if nota.nota_type == NotaType::Batch => {
                self.distribute_payment(batch_id, payment).await
            }
            _ => Ok(StepOutcome::Skipped),
        }
    }
}
