//! Debit and credit note handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, AdjustmentId};
use domain_billing::DebitCreditNote;

use crate::dto::billing::ReviewAdjustmentRequest;
use crate::{error::ApiError, AppState};

pub async fn submit_adjustment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AdjustmentId>,
) -> Result<Json<DebitCreditNote>, ApiError> {
    Ok(Json(state.service.submit_adjustment(&actor, id).await?))
}

/// Approves a note, or rejects it with a reason
pub async fn review_adjustment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AdjustmentId>,
    Json(request): Json<ReviewAdjustmentRequest>,
) -> Result<Json<DebitCreditNote>, ApiError> {
    request.validate()?;
    let note = state
        .service
        .review_adjustment(&actor, id, request.approve, request.reason)
        .await?;
    Ok(Json(note))
}

pub async fn acknowledge_adjustment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<AdjustmentId>,
) -> Result<Json<DebitCreditNote>, ApiError> {
    Ok(Json(state.service.acknowledge_adjustment(&actor, id).await?))
}
