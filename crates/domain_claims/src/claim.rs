//! Claim aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{Actor, BatchId, ClaimId, ContractId, DebtorId, Entity, Money, NotaId};
use crate::error::ClaimError;

/// Claim status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimStatus {
    /// Being prepared by the branch
    Draft,
    /// Passed the claim gate, awaiting underwriting
    Submitted,
    /// Approved; a claim nota has been raised
    Approved,
    /// Claim nota paid
    Settled,
    /// Declined by underwriting
    Rejected,
}

/// A claim against a debtor of a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    /// Unique identifier
    pub id: ClaimId,
    /// Claim number
    pub claim_number: String,
    /// Batch the debtor belongs to
    pub batch_id: BatchId,
    /// Debtor in default
    pub debtor_id: DebtorId,
    /// Contract the batch was ceded under
    pub contract_id: ContractId,
    /// Claimed amount
    pub claim_amount: Money,
    /// Status
    pub status: ClaimStatus,
    /// Claim nota raised on approval
    pub nota_id: Option<NotaId>,
    pub rejection_reason: Option<String>,
    pub created_by: String,
    pub submitted_by: Option<String>,
    pub decided_by: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Entity for Claim {
    type Id = ClaimId;
    const KIND: &'static str = "Claim";

    fn id(&self) -> ClaimId {
        self.id
    }
}

impl Claim {
    /// Creates a draft claim
    pub fn draft(
        batch_id: BatchId,
        debtor_id: DebtorId,
        contract_id: ContractId,
        claim_amount: Money,
        actor: &Actor,
    ) -> Result<Self, ClaimError> {
        if !claim_amount.is_positive() {
            return Err(ClaimError::InvalidAmount(format!(
                "claim amount must be positive, got {}",
                claim_amount
            )));
        }

        let now = Utc::now();
        let id = ClaimId::new_v7();

        Ok(Self {
            id,
            claim_number: format!("CLM-{}", &id.as_uuid().simple().to_string()[..12]),
            batch_id,
            debtor_id,
            contract_id,
            claim_amount,
            status: ClaimStatus::Draft,
            nota_id: None,
            rejection_reason: None,
            created_by: actor.email.clone(),
            submitted_by: None,
            decided_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Submits the claim; the caller has already passed the claim gate
    pub fn submit(&mut self, actor: &Actor) -> Result<ClaimStatus, ClaimError> {
        let from = self.update_status(ClaimStatus::Submitted)?;
        self.submitted_by = Some(actor.email.clone());
        Ok(from)
    }

    /// Approves the claim and links the claim nota raised for it
    pub fn approve(&mut self, nota_id: NotaId, actor: &Actor) -> Result<ClaimStatus, ClaimError> {
        let from = self.update_status(ClaimStatus::Approved)?;
        self.nota_id = Some(nota_id);
        self.decided_by = Some(actor.email.clone());
        Ok(from)
    }

    pub fn reject(&mut self, reason: &str, actor: &Actor) -> Result<ClaimStatus, ClaimError> {
        if reason.trim().is_empty() {
            return Err(ClaimError::MissingReason);
        }
        let from = self.update_status(ClaimStatus::Rejected)?;
        self.rejection_reason = Some(reason.trim().to_string());
        self.decided_by = Some(actor.email.clone());
        Ok(from)
    }

    /// Marks the claim settled; `Ok(false)` if it already was
    pub fn settle(&mut self) -> Result<bool, ClaimError> {
        if self.status == ClaimStatus::Settled {
            return Ok(false);
        }
        self.update_status(ClaimStatus::Settled)?;
        Ok(true)
    }

    fn update_status(&mut self, status: ClaimStatus) -> Result<ClaimStatus, ClaimError> {
        if !self.can_transition_to(status) {
            return Err(ClaimError::InvalidStatusTransition {
                from: format!("{:?}", self.status),
                to: format!("{:?}", status),
            });
        }
        let from = self.status;
        self.status = status;
        self.updated_at = Utc::now();
        Ok(from)
    }

    /// Checks if transition is valid
    fn can_transition_to(&self, target: ClaimStatus) -> bool {
        use ClaimStatus::*;
        matches!(
            (self.status, target),
            (Draft, Submitted) |
            (Submitted, Approved) |
            (Submitted, Rejected) |
            (Approved, Settled)
        )
    }
}
