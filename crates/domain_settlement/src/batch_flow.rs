//! Batch pipeline operations
//!
//! Intake, the operational pipeline, rejection, closing and reopening.
//! Mirror transitions driven by the nota lifecycle also land here so that
//! every batch status change is announced the same way.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use core_kernel::{
    Actor, BatchId, ContractId, CreateOutcome, Currency, IdempotencyKey, Money, Role, Versioned,
};
use domain_batch::{Batch, BatchError, BatchStatus, Debtor, ReopenImpact, UnderwritingStatus};

use crate::audit::AuditEntry;
use crate::error::WorkflowError;
use crate::notify::{Severity, TemplatedEmail};
use crate::permissions::Action;
use crate::saga::{Step, StepOutcome};
use crate::service::SettlementService;
use crate::store::{find, modify};

const MODULE: &str = "batch";

/// One already-parsed debtor row of an upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtorRecord {
    pub name: String,
    pub credit_plafond: Money,
    pub gross_premium: Money,
    pub net_premium: Money,
}

/// A validated batch upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchIntake {
    pub contract_id: ContractId,
    pub contract_reference: String,
    pub month: u32,
    pub year: i32,
    pub currency: Currency,
    pub debtors: Vec<DebtorRecord>,
}

impl BatchIntake {
    fn validate(&self) -> Result<(), WorkflowError> {
        if !(1..=12).contains(&self.month) {
            return Err(WorkflowError::validation(format!("month {} is out of range", self.month)));
        }
        if self.contract_reference.trim().is_empty() {
            return Err(WorkflowError::validation("contract reference is required"));
        }
        if self.debtors.is_empty() {
            return Err(WorkflowError::validation("a batch needs at least one debtor"));
        }

        for (row, record) in self.debtors.iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(WorkflowError::validation(format!("debtor row {}: name is required", row + 1)));
            }
            for amount in [&record.credit_plafond, &record.gross_premium, &record.net_premium] {
                if amount.currency() != self.currency {
                    return Err(WorkflowError::validation(format!(
                        "debtor row {}: expected {} amounts, got {}",
                        row + 1,
                        self.currency,
                        amount.currency()
                    )));
                }
                if amount.is_negative() {
                    return Err(WorkflowError::validation(format!(
                        "debtor row {}: amounts must not be negative",
                        row + 1
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Who hears about a batch entering `status`
fn batch_audience(status: BatchStatus) -> Role {
    match status {
        BatchStatus::Uploaded | BatchStatus::Validated | BatchStatus::Matched => Role::Underwriter,
        BatchStatus::Approved | BatchStatus::BranchConfirmed => Role::Finance,
        BatchStatus::ReopenRequested => Role::Manager,
        BatchStatus::NotaIssued
        | BatchStatus::Paid
        | BatchStatus::Closed
        | BatchStatus::Rejected
        | BatchStatus::Reopened => Role::BranchOperator,
    }
}

impl SettlementService {
    /// Creates an `Uploaded` batch and its `Submitted` debtors
    ///
    /// The batch is keyed by contract, period and how many uploads of that
    /// period were rejected before; each debtor by batch and row. Retrying
    /// an upload that failed part-way completes the same batch.
    pub async fn ingest_batch(&self, actor: &Actor, intake: BatchIntake) -> Result<Batch, WorkflowError> {
        self.permit(actor, Action::BatchIngest, MODULE, "Batch", &intake.contract_reference)
            .await?;
        self.guard(intake.validate(), || {
            AuditEntry::blocked(Action::BatchIngest, MODULE, "Batch", &intake.contract_reference, actor)
        })
        .await?;

        let (contract_id, month, year) = (intake.contract_id, intake.month, intake.year);
        let _lock = self
            .locks
            .acquire("intake", format!("{}:{:04}-{:02}", contract_id, year, month))
            .await;

        let currency = intake.currency;
        let exposure = Money::sum(currency, intake.debtors.iter().map(|d| &d.credit_plafond))?;
        let premium = Money::sum(currency, intake.debtors.iter().map(|d| &d.net_premium))?;

        let period = find(&*self.stores.batches, |b: &Batch| {
            b.contract_id == contract_id && b.month == month && b.year == year
        })
        .await?;
        let rejected = period
            .iter()
            .filter(|b| b.status == BatchStatus::Rejected)
            .count();
        let resumable = match period.iter().find(|b| b.status != BatchStatus::Rejected) {
            Some(batch) if batch.status != BatchStatus::Uploaded => Err(WorkflowError::validation(format!(
                "{} was already uploaded and is {}",
                batch.batch_number,
                batch.status.as_str()
            ))),
            Some(batch) if batch.total_exposure != exposure || batch.total_premium != premium => {
                Err(WorkflowError::validation(format!(
                    "{} is being uploaded with different debtor rows",
                    batch.batch_number
                )))
            }
            _ => Ok(()),
        };
        self.guard(resumable, || {
            AuditEntry::blocked(Action::BatchIngest, MODULE, "Batch", &intake.contract_reference, actor)
                .with_reason("duplicate upload")
        })
        .await?;

        let key = IdempotencyKey::new(
            "batch",
            format!("{}:{:04}-{:02}:r{}", contract_id, year, month, rejected),
        );
        let candidate = Batch::uploaded(
            contract_id,
            intake.contract_reference.clone(),
            month,
            year,
            currency,
            actor,
        )
        .with_raw_totals(exposure, premium);

        let (key, candidate, records) = (&key, &candidate, &intake.debtors);
        let steps = [
            Step::new("batch_created", move || Box::pin(self.intake_batch_step(key, candidate))),
            Step::new("debtors_created", move || {
                Box::pin(self.intake_debtors_step(key, candidate, records))
            }),
        ];
        let report = self.saga.run("batch_intake", &steps).await?;
        let batch = self.intake_batch(key, candidate).await?.into_inner().into_inner();
        let debtor_count = records.len();

        if !report.changed_anything() {
            info!(batch_id = %batch.id, "batch upload replayed, nothing new");
            return Ok(batch);
        }

        self.audit
            .record(
                AuditEntry::allowed(Action::BatchIngest, MODULE, "Batch", batch.id, actor)
                    .with_change(Option::<BatchStatus>::None, batch.status),
            )
            .await;
        info!(batch_id = %batch.id, batch = %batch.batch_number, debtors = debtor_count, actor = %actor.email, "batch uploaded");

        self.notifier
            .notify(
                "Batch uploaded",
                format!("{} arrived with {} debtor(s)", batch.batch_number, debtor_count),
                Severity::Info,
                MODULE,
                batch.id,
                Role::Underwriter,
            )
            .await;
        self.notifier
            .email(
                TemplatedEmail::transition("Batch", "None", batch.status.as_str(), Role::Underwriter)
                    .var("batch_number", &batch.batch_number)
                    .var("debtor_count", debtor_count),
            )
            .await;

        Ok(batch)
    }

    /// The batch stored under `key`, created from `candidate` if absent
    async fn intake_batch(
        &self,
        key: &IdempotencyKey,
        candidate: &Batch,
    ) -> Result<CreateOutcome<Batch>, WorkflowError> {
        Ok(self.stores.batches.create_once(key, candidate.clone()).await?)
    }

    async fn intake_batch_step(
        &self,
        key: &IdempotencyKey,
        candidate: &Batch,
    ) -> Result<StepOutcome, WorkflowError> {
        let created = self.intake_batch(key, candidate).await?.was_created();
        Ok(if created { StepOutcome::Applied } else { StepOutcome::Skipped })
    }

    async fn intake_debtors_step(
        &self,
        key: &IdempotencyKey,
        candidate: &Batch,
        records: &[DebtorRecord],
    ) -> Result<StepOutcome, WorkflowError> {
        let batch = self.intake_batch(key, candidate).await?.into_inner();

        let mut created = false;
        for (row, record) in records.iter().enumerate() {
            let debtor = Debtor::submitted(
                batch.id,
                batch.contract_id,
                record.name.clone(),
                record.credit_plafond,
                record.gross_premium,
                record.net_premium,
            );
            let outcome = self
                .stores
                .debtors
                .create_once(&IdempotencyKey::new("debtor", format!("{}:{}", batch.id, row)), debtor)
                .await?;
            created |= outcome.was_created();
        }
        Ok(if created { StepOutcome::Applied } else { StepOutcome::Skipped })
    }

    /// Moves a batch along its operational pipeline
    ///
    /// Entering `NotaIssued` needs a completed debtor review; `Closed` goes
    /// through [`SettlementService::close_batch`].
    pub async fn advance_batch(&self, actor: &Actor, batch_id: BatchId) -> Result<Batch, WorkflowError> {
        self.permit(actor, Action::BatchAdvance, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let current = self.stores.batches.get(batch_id).await?;
        self.commit_batch(actor, Action::BatchAdvance, current, None, |batch| batch.advance(actor))
            .await
    }

    /// Closes a `Paid` or `Reopened` batch once no debtor awaits review
    pub async fn close_batch(&self, actor: &Actor, batch_id: BatchId) -> Result<Batch, WorkflowError> {
        self.permit(actor, Action::BatchClose, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let current = self.stores.batches.get(batch_id).await?;
        let pending = find(&*self.stores.debtors, |d: &Debtor| {
            d.batch_id == batch_id && d.is_active && d.underwriting_status == UnderwritingStatus::Submitted
        })
        .await?
        .len();

        self.commit_batch(actor, Action::BatchClose, current, None, |batch| {
            batch.close(pending, actor)
        })
        .await
    }

    /// Rejects a `Matched` batch and deactivates its debtors
    pub async fn reject_batch(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        reason: &str,
    ) -> Result<Batch, WorkflowError> {
        self.permit(actor, Action::BatchReject, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let current = self.stores.batches.get(batch_id).await?;
        if current.status != BatchStatus::Rejected {
            let mut probe = current.entity.clone();
            self.guard(probe.reject(reason, actor).map_err(WorkflowError::from), || {
                AuditEntry::blocked(Action::BatchReject, MODULE, "Batch", batch_id, actor)
                    .with_change(current.status, BatchStatus::Rejected)
            })
            .await?;
        }

        let steps = [
            Step::new("batch_rejected", move || {
                Box::pin(self.reject_batch_step(actor, batch_id, reason))
            }),
            Step::new("debtors_deactivated", move || {
                Box::pin(self.deactivate_debtors_step(batch_id))
            }),
        ];
        let report = self.saga.run("batch_rejection", &steps).await?;

        let batch = self.stores.batches.get(batch_id).await?.into_inner();
        if report.applied.contains(&"batch_rejected") {
            self.announce_batch(actor, Action::BatchReject, current.status, &batch, Some(reason.to_string()))
                .await;
        }
        Ok(batch)
    }

    /// Files a reopen request against a `Closed` batch
    pub async fn request_reopen(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        reason: &str,
        impact: ReopenImpact,
    ) -> Result<Batch, WorkflowError> {
        self.permit(actor, Action::BatchRequestReopen, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let current = self.stores.batches.get(batch_id).await?;
        let batch = self
            .commit_batch(actor, Action::BatchRequestReopen, current, Some(reason.to_string()), |batch| {
                batch.request_reopen(reason, impact, actor)
            })
            .await?;

        self.notifier
            .notify(
                "Reopen requested",
                format!("{} asks to reopen {}: {}", actor.email, batch.batch_number, reason.trim()),
                Severity::Warning,
                MODULE,
                batch.id,
                Role::Manager,
            )
            .await;
        Ok(batch)
    }

    /// Approves or declines a pending reopen request
    pub async fn resolve_reopen(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        approve: bool,
    ) -> Result<Batch, WorkflowError> {
        self.permit(actor, Action::BatchResolveReopen, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let current = self.stores.batches.get(batch_id).await?;
        let reason = if approve { "reopen approved" } else { "reopen declined" };
        self.commit_batch(actor, Action::BatchResolveReopen, current, Some(reason.to_string()), |batch| {
            batch.resolve_reopen(approve, actor)
        })
        .await
    }

    /// Advances the batch behind a nota to `target` unless it already got there
    pub(crate) async fn mirror_batch(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        target: BatchStatus,
    ) -> Result<StepOutcome, WorkflowError> {
        let mut from = None;
        let result = modify(&*self.stores.batches, batch_id, self.config.max_step_retries, |batch| {
            from = Some(batch.status);
            Ok(batch.advance_to(target, actor)?)
        })
        .await;

        let (updated, changed) = self
            .guard(result, || {
                AuditEntry::blocked(Action::NotaAdvance, MODULE, "Batch", batch_id, actor)
                    .with_change(from, target)
            })
            .await?;

        match (changed, from) {
            (true, Some(previous)) => {
                self.announce_batch(actor, Action::NotaAdvance, previous, &updated, Some("nota transition".to_string()))
                    .await;
                Ok(StepOutcome::Applied)
            }
            _ => Ok(StepOutcome::Skipped),
        }
    }

    /// Applies `transition` to a freshly read batch and persists it
    async fn commit_batch<F>(
        &self,
        actor: &Actor,
        action: Action,
        current: Versioned<Batch>,
        reason: Option<String>,
        transition: F,
    ) -> Result<Batch, WorkflowError>
    where
        F: FnOnce(&mut Batch) -> Result<BatchStatus, BatchError>,
    {
        let mut batch = current.entity.clone();
        let from = self
            .guard(transition(&mut batch).map_err(WorkflowError::from), || {
                AuditEntry::blocked(action, MODULE, "Batch", current.id, actor)
                    .with_change(current.status, Option::<BatchStatus>::None)
            })
            .await?;

        let updated = self.stores.batches.update(batch, current.version).await?;
        self.announce_batch(actor, action, from, &updated, reason).await;
        Ok(updated.into_inner())
    }

    /// Audit, log and notify a batch status change
    async fn announce_batch(
        &self,
        actor: &Actor,
        action: Action,
        from: BatchStatus,
        batch: &Batch,
        reason: Option<String>,
    ) {
        let mut entry = AuditEntry::allowed(action, MODULE, "Batch", batch.id, actor)
            .with_change(from, batch.status);
        if let Some(reason) = reason {
            entry = entry.with_reason(reason);
        }
        self.audit.record(entry).await;

        info!(
            batch_id = %batch.id,
            from = from.as_str(),
            to = batch.status.as_str(),
            actor = %actor.email,
            "batch transitioned"
        );

        let mut email = TemplatedEmail::transition(
            "Batch",
            from.as_str(),
            batch.status.as_str(),
            batch_audience(batch.status),
        )
        .var("batch_number", &batch.batch_number)
        .var("period", format!("{:04}-{:02}", batch.year, batch.month));

        match batch.final_premium_amount {
            Some(premium) => email = email.var("final_premium", premium),
            None if batch.status.has_reached(BatchStatus::Approved) => {
                warn!(batch_id = %batch.id, "final amounts missing, amount omitted from email");
            }
            None => {}
        }
        self.notifier.email(email).await;
    }

    async fn reject_batch_step(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        reason: &str,
    ) -> Result<StepOutcome, WorkflowError> {
        let (_, changed) = modify(&*self.stores.batches, batch_id, self.config.max_step_retries, |batch| {
            if batch.status == BatchStatus::Rejected {
                return Ok(false);
            }
            batch.reject(reason, actor)?;
            Ok(true)
        })
        .await?;
        Ok(if changed { StepOutcome::Applied } else { StepOutcome::Skipped })
    }

    async fn deactivate_debtors_step(&self, batch_id: BatchId) -> Result<StepOutcome, WorkflowError> {
        let active = find(&*self.stores.debtors, |d: &Debtor| d.batch_id == batch_id && d.is_active).await?;
        if active.is_empty() {
            return Ok(StepOutcome::Skipped);
        }

        for debtor in active {
            modify(&*self.stores.debtors, debtor.id, self.config.max_step_retries, |d| {
                if !d.is_active {
                    return Ok(false);
                }
                d.deactivate(BatchStatus::Rejected);
                Ok(true)
            })
            .await?;
        }
        Ok(StepOutcome::Applied)
    }
}
