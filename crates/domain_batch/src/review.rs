//! Debtor review computations
//!
//! Review is the only place where money behind a batch is finalized. On
//! approval a debtor's exposure and premium are snapshotted into an
//! [`AcceptedDebtor`]; later edits of the debtor do not move the snapshot.
//! Once no debtor is pending, the batch's final amounts are the sum of the
//! snapshots of approved debtors.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use core_kernel::{BatchId, Currency, DebtorId, Entity, Money, MoneyError};

use crate::debtor::{Debtor, UnderwritingStatus};

/// Snapshot of an approved debtor's amounts at decision time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedDebtor {
    pub debtor_id: DebtorId,
    pub batch_id: BatchId,
    pub exposure_amount: Money,
    pub premium_amount: Money,
    pub accepted_by: String,
    pub accepted_at: DateTime<Utc>,
}

impl Entity for AcceptedDebtor {
    type Id = DebtorId;
    const KIND: &'static str = "AcceptedDebtor";

    fn id(&self) -> DebtorId {
        self.debtor_id
    }
}

impl AcceptedDebtor {
    pub fn snapshot(debtor: &Debtor, accepted_by: &str) -> Self {
        Self {
            debtor_id: debtor.id,
            batch_id: debtor.batch_id,
            exposure_amount: debtor.exposure_amount(),
            premium_amount: debtor.premium_amount(),
            accepted_by: accepted_by.to_string(),
            accepted_at: Utc::now(),
        }
    }
}

/// Counts of debtor decisions within a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewProgress {
    pub total: usize,
    pub approved: usize,
    pub rejected: usize,
    pub pending: usize,
}

impl ReviewProgress {
    /// Counts active debtors only; debtors of a rejected batch do not block
    pub fn compute<'a>(debtors: impl IntoIterator<Item = &'a Debtor>) -> Self {
        let mut progress = ReviewProgress {
            total: 0,
            approved: 0,
            rejected: 0,
            pending: 0,
        };

        for debtor in debtors.into_iter().filter(|d| d.is_active) {
            progress.total += 1;
            match debtor.underwriting_status {
                UnderwritingStatus::Approved => progress.approved += 1,
                UnderwritingStatus::Rejected => progress.rejected += 1,
                UnderwritingStatus::Submitted => progress.pending += 1,
            }
        }

        progress
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.pending == 0
    }

    /// A batch with nothing approved has no money to bill
    pub fn is_ready_for_nota(&self) -> bool {
        self.is_complete() && self.approved > 0
    }
}

/// Final exposure and premium of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAmounts {
    pub exposure: Money,
    pub premium: Money,
}

impl FinalAmounts {
    /// Sums the snapshots of currently approved debtors
    ///
    /// Snapshots of debtors that are no longer approved are ignored.
    pub fn from_snapshots(
        currency: Currency,
        debtors: &[Debtor],
        snapshots: &[AcceptedDebtor],
    ) -> Result<Self, MoneyError> {
        let approved: HashSet<DebtorId> = debtors
            .iter()
            .filter(|d| d.is_active && d.underwriting_status == UnderwritingStatus::Approved)
            .map(|d| d.id)
            .collect();

        let counted: Vec<&AcceptedDebtor> = snapshots
            .iter()
            .filter(|s| approved.contains(&s.debtor_id))
            .collect();

        Ok(Self {
            exposure: Money::sum(currency, counted.iter().copied().map(|s| &s.exposure_amount))?,
            premium: Money::sum(currency, counted.iter().copied().map(|s| &s.premium_amount))?,
        })
    }
}

/// What debtor review reports back to the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub progress: ReviewProgress,
    /// Present only once review is complete
    pub final_amounts: Option<FinalAmounts>,
}

impl ReviewOutcome {
    pub fn evaluate(
        currency: Currency,
        debtors: &[Debtor],
        snapshots: &[AcceptedDebtor],
    ) -> Result<Self, MoneyError> {
        let progress = ReviewProgress::compute(debtors);
        let final_amounts = if progress.is_complete() {
            Some(FinalAmounts::from_snapshots(currency, debtors, snapshots)?)
        } else {
            None
        };

        Ok(Self {
            progress,
            final_amounts,
        })
    }
}
