//! Claims
//!
//! A claim may only be submitted once its batch's nota is paid. Approval
//! raises a claim nota, whose settlement marks the claim settled.

use tracing::{debug, info};

use core_kernel::{Actor, BatchId, ClaimId, DebtorId, IdempotencyKey, Money, Role, Versioned};
use domain_billing::{Nota, NotaReference, NotaType};
use domain_claims::{ensure_claim_submittable, Claim, ClaimError, ClaimStatus};

use crate::audit::AuditEntry;
use crate::error::WorkflowError;
use crate::notify::{Severity, TemplatedEmail};
use crate::permissions::Action;
use crate::service::SettlementService;
use crate::store::find;

const MODULE: &str = "claim";

impl SettlementService {
    /// Drafts a claim against a debtor of a batch
    pub async fn create_claim(
        &self,
        actor: &Actor,
        batch_id: BatchId,
        debtor_id: DebtorId,
        claim_amount: Money,
    ) -> Result<Claim, WorkflowError> {
        self.permit(actor, Action::ClaimCreate, MODULE, "Batch", batch_id).await?;

        let batch = self.stores.batches.get(batch_id).await?;
        let debtor = self.stores.debtors.get(debtor_id).await?;
        let belongs = if debtor.batch_id == batch_id {
            Ok(())
        } else {
            Err(WorkflowError::validation(format!(
                "debtor {} does not belong to batch {}",
                debtor_id, batch.batch_number
            )))
        };
        self.guard(belongs, || {
            AuditEntry::blocked(Action::ClaimCreate, MODULE, "Debtor", debtor_id, actor)
        })
        .await?;

        let claim = Claim::draft(batch_id, debtor_id, batch.contract_id, claim_amount, actor)?;
        let claim = self.stores.claims.create(claim).await?.into_inner();

        self.audit
            .record(
                AuditEntry::allowed(Action::ClaimCreate, MODULE, "Claim", claim.id, actor)
                    .with_change(Option::<ClaimStatus>::None, claim.status),
            )
            .await;
        info!(claim = %claim.claim_number, batch_id = %batch_id, amount = %claim.claim_amount, "claim drafted");
        Ok(claim)
    }

    /// Submits a claim once the batch nota is paid
    pub async fn submit_claim(&self, actor: &Actor, claim_id: ClaimId) -> Result<Claim, WorkflowError> {
        self.permit(actor, Action::ClaimSubmit, MODULE, "Claim", claim_id).await?;
        let _lock = self.locks.acquire("claim", claim_id).await;

        let current = self.stores.claims.get(claim_id).await?;
        let batch_id = current.batch_id;
        let notas = find(&*self.stores.notas, |n: &Nota| n.reference.batch_id() == Some(batch_id)).await?;
        let blocked = || {
            AuditEntry::blocked(Action::ClaimSubmit, MODULE, "Claim", claim_id, actor)
                .with_change(current.status, ClaimStatus::Submitted)
        };
        self.guard(
            ensure_claim_submittable(batch_id, &notas).map_err(WorkflowError::from),
            blocked,
        )
        .await?;

        self.commit_claim(actor, Action::ClaimSubmit, &current, blocked, |claim| claim.submit(actor))
            .await
            .map(|(claim, _)| claim)
    }

    /// Approves a submitted claim and raises its claim nota
    pub async fn approve_claim(&self, actor: &Actor, claim_id: ClaimId) -> Result<Claim, WorkflowError> {
        self.permit(actor, Action::ClaimDecide, MODULE, "Claim", claim_id).await?;
        let _lock = self.locks.acquire("claim", claim_id).await;

        let current = self.stores.claims.get(claim_id).await?;
        if current.status == ClaimStatus::Approved {
            debug!(claim = %current.claim_number, "claim already approved");
            return Ok(current.into_inner());
        }
        let blocked = || {
            AuditEntry::blocked(Action::ClaimDecide, MODULE, "Claim", claim_id, actor)
                .with_change(current.status, ClaimStatus::Approved)
        };
        let submitted = if current.status == ClaimStatus::Submitted {
            Ok(())
        } else {
            Err(WorkflowError::from(ClaimError::InvalidStatusTransition {
                from: format!("{:?}", current.status),
                to: format!("{:?}", ClaimStatus::Approved),
            }))
        };
        self.guard(submitted, blocked).await?;

        let draft = Nota::draft(
            NotaType::Claim,
            NotaReference::Claim(claim_id),
            current.contract_id,
            current.claim_amount,
            actor,
        )?;
        let nota = self
            .stores
            .notas
            .create_once(&IdempotencyKey::new("claim-nota", claim_id), draft)
            .await?
            .into_inner()
            .into_inner();

        let (claim, _) = self
            .commit_claim(actor, Action::ClaimDecide, &current, blocked, |claim| {
                claim.approve(nota.id, actor)
            })
            .await?;

        self.audit
            .record(
                AuditEntry::allowed(Action::NotaCreate, MODULE, "Nota", nota.id, actor)
                    .with_reason(format!("claim {}", claim.claim_number)),
            )
            .await;
        self.notifier
            .notify(
                "Claim approved",
                format!("{} approved; nota {} raised for {}", claim.claim_number, nota.nota_number, nota.amount()),
                Severity::Info,
                MODULE,
                claim_id,
                Role::Finance,
            )
            .await;

        Ok(claim)
    }

    pub async fn reject_claim(&self, actor: &Actor, claim_id: ClaimId, reason: &str) -> Result<Claim, WorkflowError> {
        self.permit(actor, Action::ClaimDecide, MODULE, "Claim", claim_id).await?;
        let _lock = self.locks.acquire("claim", claim_id).await;

        let current = self.stores.claims.get(claim_id).await?;
        let blocked = || {
            AuditEntry::blocked(Action::ClaimDecide, MODULE, "Claim", claim_id, actor)
                .with_change(current.status, ClaimStatus::Rejected)
        };
        self.commit_claim(actor, Action::ClaimDecide, &current, blocked, |claim| {
            claim.reject(reason, actor)
        })
        .await
        .map(|(claim, _)| claim)
    }

    async fn commit_claim<F, B>(
        &self,
        actor: &Actor,
        action: Action,
        current: &Versioned<Claim>,
        blocked: B,
        transition: F,
    ) -> Result<(Claim, ClaimStatus), WorkflowError>
    where
        F: FnOnce(&mut Claim) -> Result<ClaimStatus, ClaimError>,
        B: FnOnce() -> AuditEntry,
    {
        let mut claim = current.entity.clone();
        let from = self
            .guard(transition(&mut claim).map_err(WorkflowError::from), blocked)
            .await?;
        let updated = self.stores.claims.update(claim, current.version).await?;

        let mut entry = AuditEntry::allowed(action, MODULE, "Claim", updated.id, actor)
            .with_change(from, updated.status);
        if let Some(reason) = &updated.rejection_reason {
            entry = entry.with_reason(reason.clone());
        }
        self.audit.record(entry).await;
        info!(
            claim = %updated.claim_number,
            from = ?from,
            to = ?updated.status,
            actor = %actor.email,
            "claim transitioned"
        );

        let audience = match updated.status {
            ClaimStatus::Submitted => Role::Underwriter,
            _ => Role::BranchOperator,
        };
        self.notifier
            .email(
                TemplatedEmail::transition(
                    "Claim",
                    &format!("{:?}", from),
                    &format!("{:?}", updated.status),
                    audience,
                )
                .var("claim_number", &updated.claim_number)
                .var("amount", updated.claim_amount),
            )
            .await;

        Ok((updated.into_inner(), from))
    }
}
