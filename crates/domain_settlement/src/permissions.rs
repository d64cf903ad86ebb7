//! Who may do what
//!
//! Permission checks live at the orchestrator boundary, apart from the state
//! machines. A denied action is reported as an invalid transition and
//! audited like any other blocked attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

use core_kernel::{Actor, Role};

/// Every guarded workflow action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    BatchIngest,
    BatchAdvance,
    BatchReject,
    BatchClose,
    BatchRequestReopen,
    BatchResolveReopen,
    DebtorDecide,
    DebtorRevise,
    NotaCreate,
    NotaAdvance,
    IntentSubmit,
    IntentApprove,
    IntentReject,
    PaymentRecord,
    PaymentMatch,
    ReconciliationClose,
    AdjustmentOpen,
    AdjustmentSubmit,
    AdjustmentReview,
    AdjustmentAcknowledge,
    ClaimCreate,
    ClaimSubmit,
    ClaimDecide,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::BatchIngest => "batch_ingest",
            Action::BatchAdvance => "batch_advance",
            Action::BatchReject => "batch_reject",
            Action::BatchClose => "batch_close",
            Action::BatchRequestReopen => "batch_request_reopen",
            Action::BatchResolveReopen => "batch_resolve_reopen",
            Action::DebtorDecide => "debtor_decide",
            Action::DebtorRevise => "debtor_revise",
            Action::NotaCreate => "nota_create",
            Action::NotaAdvance => "nota_advance",
            Action::IntentSubmit => "intent_submit",
            Action::IntentApprove => "intent_approve",
            Action::IntentReject => "intent_reject",
            Action::PaymentRecord => "payment_record",
            Action::PaymentMatch => "payment_match",
            Action::ReconciliationClose => "reconciliation_close",
            Action::AdjustmentOpen => "adjustment_open",
            Action::AdjustmentSubmit => "adjustment_submit",
            Action::AdjustmentReview => "adjustment_review",
            Action::AdjustmentAcknowledge => "adjustment_acknowledge",
            Action::ClaimCreate => "claim_create",
            Action::ClaimSubmit => "claim_submit",
            Action::ClaimDecide => "claim_decide",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `actor` may perform `action`
pub fn can(actor: &Actor, action: Action) -> bool {
    use Action::*;
    use Role::*;

    if actor.role == Admin {
        return true;
    }

    match action {
        BatchIngest | DebtorRevise | ClaimCreate | ClaimSubmit => actor.role == BranchOperator,
        BatchAdvance => matches!(actor.role, BranchOperator | Underwriter),
        BatchReject | BatchClose | DebtorDecide | ClaimDecide => actor.role == Underwriter,
        BatchRequestReopen => matches!(actor.role, BranchOperator | Underwriter | Finance | Manager),
        BatchResolveReopen | IntentApprove | IntentReject => actor.role.is_elevated(),
        NotaCreate | NotaAdvance | IntentSubmit | PaymentRecord | PaymentMatch
        | ReconciliationClose | AdjustmentOpen | AdjustmentSubmit => actor.role == Finance,
        AdjustmentReview => actor.role == Manager,
        AdjustmentAcknowledge => actor.role == Counterparty,
    }
}
