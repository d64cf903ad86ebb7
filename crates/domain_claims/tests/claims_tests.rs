//! Integration tests for domain_claims

use rust_decimal_macros::dec;

use core_kernel::{Actor, BatchId, ContractId, DebtorId, Money, Role};
use domain_billing::{Nota, NotaReference, NotaType};
use domain_claims::{can_submit_claim, ensure_claim_submittable, Claim, ClaimError, ClaimStatus};

fn finance() -> Actor {
    Actor::new("fin@reinsure.test", Role::Finance)
}

// ============================================================================
// Gate and Lifecycle Tests
// ============================================================================

#[test]
fn test_claim_follows_batch_payment() {
    let batch_id = BatchId::new();
    let contract_id = ContractId::new();
    let operator = Actor::new("ops@branch.test", Role::BranchOperator);
    let underwriter = Actor::new("uw@reinsure.test", Role::Underwriter);

    let mut batch_nota = Nota::draft(
        NotaType::Batch,
        NotaReference::Batch(batch_id),
        contract_id,
        Money::idr(dec!(4000000)),
        &finance(),
    )
    .unwrap();

    let mut claim = Claim::draft(
        batch_id,
        DebtorId::new(),
        contract_id,
        Money::idr(dec!(15000000)),
        &operator,
    )
    .unwrap();

    // Draft, Issued, Confirmed all keep the gate shut
    for _ in 0..3 {
        assert!(matches!(
            ensure_claim_submittable(batch_id, std::slice::from_ref(&batch_nota)),
            Err(ClaimError::Blocked(_))
        ));
        batch_nota.advance(&finance(), None).unwrap();
    }

    let notas = vec![batch_nota];
    assert!(can_submit_claim(batch_id, &notas));
    claim.submit(&operator).unwrap();

    let claim_nota = Nota::draft(
        NotaType::Claim,
        NotaReference::Claim(claim.id),
        contract_id,
        claim.claim_amount,
        &underwriter,
    )
    .unwrap();
    claim.approve(claim_nota.id, &underwriter).unwrap();
    assert_eq!(claim.status, ClaimStatus::Approved);
    assert_eq!(claim_nota.reference.claim_id(), Some(claim.id));
}

#[test]
fn test_claim_serializes_status() {
    let claim = Claim::draft(
        BatchId::new(),
        DebtorId::new(),
        ContractId::new(),
        Money::idr(dec!(1000000)),
        &finance(),
    )
    .unwrap();

    let json = serde_json::to_value(&claim).unwrap();
    assert_eq!(json["status"], "Draft");
}
