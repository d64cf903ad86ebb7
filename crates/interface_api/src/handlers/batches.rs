//! Batch handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, BatchId};
use domain_batch::{Batch, Debtor};
use domain_billing::Nota;
use domain_claims::Claim;
use domain_settlement::BulkDecisionReport;

use crate::dto::batches::*;
use crate::dto::ReasonRequest;
use crate::{error::ApiError, AppState};

/// Uploads a batch with its debtor rows
pub async fn ingest_batch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<IngestBatchRequest>,
) -> Result<(StatusCode, Json<Batch>), ApiError> {
    request.validate()?;
    let batch = state.service.ingest_batch(&actor, request.into()).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// Lists batches, newest period first
pub async fn list_batches(State(state): State<AppState>) -> Result<Json<Vec<Batch>>, ApiError> {
    Ok(Json(state.service.list_batches().await?))
}

/// Gets a batch with its review progress
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<BatchDetailResponse>, ApiError> {
    let batch = state.service.get_batch(id).await?;
    let progress = state.service.review_progress(id).await?;
    Ok(Json(BatchDetailResponse { batch, progress }))
}

/// Moves a batch to its next status
pub async fn advance_batch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
) -> Result<Json<Batch>, ApiError> {
    Ok(Json(state.service.advance_batch(&actor, id).await?))
}

pub async fn close_batch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
) -> Result<Json<Batch>, ApiError> {
    Ok(Json(state.service.close_batch(&actor, id).await?))
}

pub async fn reject_batch(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<Batch>, ApiError> {
    request.validate()?;
    Ok(Json(state.service.reject_batch(&actor, id, &request.reason).await?))
}

/// Asks to reopen a closed batch
pub async fn request_reopen(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
    Json(request): Json<RequestReopenRequest>,
) -> Result<Json<Batch>, ApiError> {
    request.validate()?;
    let batch = state
        .service
        .request_reopen(&actor, id, &request.reason, request.impact)
        .await?;
    Ok(Json(batch))
}

pub async fn resolve_reopen(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
    Json(request): Json<ResolveReopenRequest>,
) -> Result<Json<Batch>, ApiError> {
    Ok(Json(state.service.resolve_reopen(&actor, id, request.approve).await?))
}

pub async fn list_debtors(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<Vec<Debtor>>, ApiError> {
    Ok(Json(state.service.debtors_of(id).await?))
}

/// Decides several debtors of one batch
pub async fn bulk_decide(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
    Json(request): Json<BulkDecideRequest>,
) -> Result<Json<BulkDecisionReport>, ApiError> {
    request.validate()?;
    Ok(Json(state.service.bulk_decide(&actor, id, request.decisions).await?))
}

/// Raises the nota billing an approved batch
pub async fn create_nota(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<BatchId>,
) -> Result<(StatusCode, Json<Nota>), ApiError> {
    let nota = state.service.create_batch_nota(&actor, id).await?;
    Ok((StatusCode::CREATED, Json(nota)))
}

pub async fn list_notas(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<Vec<Nota>>, ApiError> {
    Ok(Json(state.service.notas_of_batch(id).await?))
}

pub async fn list_claims(
    State(state): State<AppState>,
    Path(id): Path<BatchId>,
) -> Result<Json<Vec<Claim>>, ApiError> {
    Ok(Json(state.service.claims_of_batch(id).await?))
}
