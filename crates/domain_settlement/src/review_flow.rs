//! Debtor review
//!
//! Decisions are taken under the batch lock. After every decision the
//! batch's review flags and final amounts are recomputed from the debtors
//! and their accepted snapshots; this is the only writer of those fields.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use core_kernel::{Actor, BatchId, DebtorId, IdempotencyKey, Money, Role};
use domain_batch::{
    AcceptedDebtor, Debtor, ReviewOutcome, ReviewProgress, UnderwritingDecision, UnderwritingStatus,
};

use crate::audit::AuditEntry;
use crate::error::WorkflowError;
use crate::notify::{Severity, TemplatedEmail};
use crate::permissions::Action;
use crate::service::SettlementService;
use crate::store::{find, modify};

const MODULE: &str = "debtor_review";

/// One entry of a bulk decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDecision {
    pub debtor_id: DebtorId,
    pub decision: UnderwritingDecision,
    pub remarks: Option<String>,
}

/// What a bulk decision achieved
#[derive(Debug, Clone, Serialize)]
pub struct BulkDecisionReport {
    pub decided: Vec<Debtor>,
    /// Debtors that were refused, with the reason
    pub failed: Vec<(DebtorId, String)>,
    pub progress: ReviewProgress,
}

fn accepted_key(debtor_id: DebtorId) -> IdempotencyKey {
    IdempotencyKey::new("accepted-debtor", debtor_id)
}

impl SettlementService {
    /// Approves or rejects one debtor
    pub async fn decide_debtor(
        &self,
        actor: &Actor,
        debtor_id: DebtorId,
        decision: UnderwritingDecision,
        remarks: Option<String>,
    ) -> Result<Debtor, WorkflowError> {
        self.permit(actor, Action::DebtorDecide, MODULE, "Debtor", debtor_id).await?;

        let batch_id = self.stores.debtors.get(debtor_id).await?.batch_id;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let debtor = self.decide_locked(actor, batch_id, debtor_id, decision, remarks).await?;
        self.refresh_review(actor, batch_id).await?;
        Ok(debtor)
    }

    /// Decides a selection of debtors of one batch
    ///
    /// Each debtor is decided and audited on its own; a refused debtor does
    /// not stop the rest. Store failures do.
    pub async fn bulk_decide(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        decisions: Vec<BulkDecision>,
    ) -> Result<BulkDecisionReport, WorkflowError> {
        self.permit(actor, Action::DebtorDecide, MODULE, "Batch", batch_id).await?;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let mut decided = Vec::new();
        let mut failed = Vec::new();
        for item in decisions {
            match self
                .decide_locked(actor, batch_id, item.debtor_id, item.decision, item.remarks)
                .await
            {
                Ok(debtor) => decided.push(debtor),
                Err(err @ WorkflowError::Store(_)) => return Err(err),
                Err(err) => failed.push((item.debtor_id, err.to_string())),
            }
        }

        let progress = self.refresh_review(actor, batch_id).await?;
        info!(
            batch_id = %batch_id,
            decided = decided.len(),
            failed = failed.len(),
            pending = progress.pending,
            "bulk review applied"
        );

        Ok(BulkDecisionReport {
            decided,
            failed,
            progress,
        })
    }

    /// Corrects a rejected debtor and puts it back into review
    pub async fn revise_debtor(
        &self,
        actor: &Actor,
        debtor_id: DebtorId,
        credit_plafond: Money,
        gross_premium: Money,
        net_premium: Money,
    ) -> Result<Debtor, WorkflowError> {
        self.permit(actor, Action::DebtorRevise, MODULE, "Debtor", debtor_id).await?;

        let batch_id = self.stores.debtors.get(debtor_id).await?.batch_id;
        let _lock = self.locks.acquire("batch", batch_id).await;

        let batch = self.stores.batches.get(batch_id).await?;
        let current = self.stores.debtors.get(debtor_id).await?;
        let blocked = || {
            AuditEntry::blocked(Action::DebtorRevise, MODULE, "Debtor", debtor_id, actor)
                .with_change(current.underwriting_status, UnderwritingStatus::Submitted)
        };

        self.guard(batch.ensure_debtors_mutable().map_err(WorkflowError::from), blocked)
            .await?;

        let amounts = [&credit_plafond, &gross_premium, &net_premium];
        let checked = if amounts.iter().any(|m| m.currency() != batch.currency) {
            Err(WorkflowError::validation(format!("debtor amounts must be in {}", batch.currency)))
        } else if amounts.iter().any(|m| m.is_negative()) {
            Err(WorkflowError::validation("debtor amounts must not be negative"))
        } else {
            Ok(())
        };
        self.guard(checked, blocked).await?;

        let mut debtor = current.entity.clone();
        self.guard(
            debtor
                .revise(credit_plafond, gross_premium, net_premium)
                .map_err(WorkflowError::from),
            blocked,
        )
        .await?;
        let updated = self.stores.debtors.update(debtor, current.version).await?;

        self.audit
            .record(
                AuditEntry::allowed(Action::DebtorRevise, MODULE, "Debtor", debtor_id, actor).with_change(
                    (current.credit_plafond, current.net_premium),
                    (updated.credit_plafond, updated.net_premium),
                ),
            )
            .await;
        info!(debtor_id = %debtor_id, batch_id = %batch_id, actor = %actor.email, "debtor resubmitted");

        self.refresh_review(actor, batch_id).await?;
        self.notifier
            .notify(
                "Debtor resubmitted",
                format!("{} was corrected and awaits review", updated.name),
                Severity::Info,
                MODULE,
                debtor_id,
                Role::Underwriter,
            )
            .await;

        Ok(updated.into_inner())
    }

    /// Current review progress of a batch
    pub async fn review_progress(&self, batch_id: BatchId) -> Result<ReviewProgress, WorkflowError> {
        let debtors = find(&*self.stores.debtors, |d: &Debtor| d.batch_id == batch_id).await?;
        Ok(ReviewProgress::compute(&debtors))
    }

    /// Decides one debtor; the caller holds the batch lock
    async fn decide_locked(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        debtor_id: DebtorId,
        decision: UnderwritingDecision,
        remarks: Option<String>,
    ) -> Result<Debtor, WorkflowError> {
        let batch = self.stores.batches.get(batch_id).await?;
        let current = self.stores.debtors.get(debtor_id).await?;
        let blocked = || {
            AuditEntry::blocked(Action::DebtorDecide, MODULE, "Debtor", debtor_id, actor)
                .with_change(current.underwriting_status, decision.resulting_status())
        };

        let belongs = if current.batch_id == batch_id {
            Ok(())
        } else {
            Err(WorkflowError::validation(format!(
                "debtor {} does not belong to batch {}",
                debtor_id, batch_id
            )))
        };
        self.guard(belongs, blocked).await?;
        self.guard(batch.ensure_debtors_mutable().map_err(WorkflowError::from), blocked)
            .await?;

        let mut debtor = current.entity.clone();
        let previous = self
            .guard(
                debtor.decide(decision, remarks.clone(), actor).map_err(WorkflowError::from),
                blocked,
            )
            .await?;
        let updated = self.stores.debtors.update(debtor, current.version).await?;

        if updated.underwriting_status == UnderwritingStatus::Approved {
            self.snapshot_accepted(&updated, actor).await?;
        }

        let mut entry = AuditEntry::allowed(Action::DebtorDecide, MODULE, "Debtor", debtor_id, actor)
            .with_change(previous, updated.underwriting_status);
        if let Some(remarks) = remarks {
            entry = entry.with_reason(remarks);
        }
        self.audit.record(entry).await;
        info!(
            debtor_id = %debtor_id,
            batch_id = %batch_id,
            status = ?updated.underwriting_status,
            actor = %actor.email,
            "debtor decided"
        );

        Ok(updated.into_inner())
    }

    async fn snapshot_accepted(&self, debtor: &Debtor, actor: &Actor) -> Result<AcceptedDebtor, WorkflowError> {
        let outcome = self
            .stores
            .accepted_debtors
            .create_once(&accepted_key(debtor.id), AcceptedDebtor::snapshot(debtor, &actor.email))
            .await?;
        if !outcome.was_created() {
            debug!(debtor_id = %debtor.id, "accepted snapshot already exists");
        }
        Ok(outcome.into_inner().into_inner())
    }

    /// Recomputes and persists the batch's review flags and final amounts
    ///
    /// Approved debtors missing their snapshot (an interrupted decision) get
    /// one here; approved debtors cannot be edited, so their current amounts
    /// are still the decision-time amounts.
    pub(crate) async fn refresh_review(
        &self,
        actor: &Actor,
        batch_id: BatchId,
    ) -> Result<ReviewProgress, WorkflowError> {
        let debtors = find(&*self.stores.debtors, |d: &Debtor| d.batch_id == batch_id).await?;
        let mut snapshots =
            find(&*self.stores.accepted_debtors, |s: &AcceptedDebtor| s.batch_id == batch_id).await?;

        for debtor in debtors
            .iter()
            .filter(|d| d.is_active && d.underwriting_status == UnderwritingStatus::Approved)
        {
            if !snapshots.iter().any(|s| s.debtor_id == debtor.id) {
                snapshots.push(self.snapshot_accepted(debtor, actor).await?);
            }
        }

        let currency = self.stores.batches.get(batch_id).await?.currency;
        let outcome = ReviewOutcome::evaluate(currency, &debtors, &snapshots)?;

        let mut before = None;
        let mut retained = false;
        let (batch, changed) = modify(&*self.stores.batches, batch_id, self.config.max_step_retries, |b| {
            let flags = (b.debtor_review_completed, b.batch_ready_for_nota, b.final_premium_amount);
            retained = b.record_review_outcome(&outcome);
            before = Some(flags);
            Ok(flags != (b.debtor_review_completed, b.batch_ready_for_nota, b.final_premium_amount))
        })
        .await?;

        if changed {
            let entry = AuditEntry::allowed(Action::DebtorDecide, MODULE, "Batch", batch_id, actor)
                .with_change(
                    before,
                    (batch.debtor_review_completed, batch.batch_ready_for_nota, batch.final_premium_amount),
                );
            let entry = if retained {
                entry.with_reason("review recomputed; final amounts retained")
            } else {
                entry.with_reason("review recomputed")
            };
            self.audit.record(entry).await;
            info!(
                batch_id = %batch_id,
                completed = batch.debtor_review_completed,
                ready_for_nota = batch.batch_ready_for_nota,
                "batch review flags updated"
            );
        }

        let became_ready = changed
            && batch.batch_ready_for_nota
            && before.map(|(_, ready, _)| !ready).unwrap_or(true);
        if became_ready {
            if let Some(premium) = batch.final_premium_amount {
                self.notifier
                    .notify(
                        "Batch ready for nota",
                        format!("{} finished review; final premium {}", batch.batch_number, premium),
                        Severity::Info,
                        MODULE,
                        batch_id,
                        Role::Finance,
                    )
                    .await;
                self.notifier
                    .email(
                        TemplatedEmail::transition("DebtorReview", "Pending", "Completed", Role::Finance)
                            .var("batch_number", &batch.batch_number)
                            .var("final_premium", premium)
                            .var("approved", outcome.progress.approved),
                    )
                    .await;
            }
        }

        Ok(outcome.progress)
    }
}
