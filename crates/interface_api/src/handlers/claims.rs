//! Claims handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, ClaimId};
use domain_claims::Claim;

use crate::dto::claims::CreateClaimRequest;
use crate::dto::ReasonRequest;
use crate::{error::ApiError, AppState};

/// Drafts a claim against a debtor
pub async fn create_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateClaimRequest>,
) -> Result<(StatusCode, Json<Claim>), ApiError> {
    let claim = state
        .service
        .create_claim(&actor, request.batch_id, request.debtor_id, request.claim_amount())
        .await?;
    Ok((StatusCode::CREATED, Json(claim)))
}

pub async fn get_claim(
    State(state): State<AppState>,
    Path(id): Path<ClaimId>,
) -> Result<Json<Claim>, ApiError> {
    Ok(Json(state.service.get_claim(id).await?))
}

pub async fn submit_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<ClaimId>,
) -> Result<Json<Claim>, ApiError> {
    Ok(Json(state.service.submit_claim(&actor, id).await?))
}

/// Approves a claim and raises its claim nota
pub async fn approve_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<ClaimId>,
) -> Result<Json<Claim>, ApiError> {
    Ok(Json(state.service.approve_claim(&actor, id).await?))
}

pub async fn reject_claim(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<ClaimId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<Claim>, ApiError> {
    request.validate()?;
    Ok(Json(state.service.reject_claim(&actor, id, &request.reason).await?))
}
