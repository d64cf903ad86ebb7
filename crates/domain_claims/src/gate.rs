//! Claim gate
//!
//! A claim may only be submitted for a batch that has at least one paid
//! batch nota. Claim notas of the same batch do not count.

use core_kernel::BatchId;
use domain_billing::{Nota, NotaType};

use crate::error::ClaimError;

/// True only if some batch nota of `batch_id` is paid
pub fn can_submit_claim(batch_id: BatchId, notas: &[Nota]) -> bool {
    notas.iter().any(|n| {
        n.nota_type == NotaType::Batch && n.reference.batch_id() == Some(batch_id) && n.is_paid()
    })
}

/// Same check, with a reason the caller can show and audit
pub fn ensure_claim_submittable(batch_id: BatchId, notas: &[Nota]) -> Result<(), ClaimError> {
    if can_submit_claim(batch_id, notas) {
        return Ok(());
    }

    let batch_notas: Vec<_> = notas
        .iter()
        .filter(|n| n.nota_type == NotaType::Batch && n.reference.batch_id() == Some(batch_id))
        .collect();

    let reason = match batch_notas.as_slice() {
        [] => format!("batch {} has no nota yet", batch_id),
        found => format!(
            "no paid nota for batch {} (current: {})",
            batch_id,
            found
                .iter()
                .map(|n| format!("{} {}", n.nota_number, n.status.as_str()))
                .collect::<Vec<_>>()
                .join(", ")
        ),
    };
    Err(ClaimError::Blocked(reason))
}
