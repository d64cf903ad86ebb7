//! Nota, intent and reconciliation handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, NotaId, PaymentIntentId};
use domain_billing::{DebitCreditNote, Nota, PaymentIntent, ReconciliationItem};

use crate::dto::billing::{AdvanceNotaRequest, NotaDetailResponse, OpenAdjustmentRequest};
use crate::dto::ReasonRequest;
use crate::{error::ApiError, AppState};

/// Gets a nota with its invoice and payment intents
pub async fn get_nota(
    State(state): State<AppState>,
    Path(id): Path<NotaId>,
) -> Result<Json<NotaDetailResponse>, ApiError> {
    let nota = state.service.get_nota(id).await?;
    let invoice = state.service.invoice_of_nota(id).await?;
    let intents = state.service.intents_for_nota(id).await?;
    Ok(Json(NotaDetailResponse { nota, invoice, intents }))
}

/// Moves a nota to its next status; marking it paid runs settlement
pub async fn advance_nota(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NotaId>,
    request: Option<Json<AdvanceNotaRequest>>,
) -> Result<Json<Nota>, ApiError> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;
    let nota = state
        .service
        .advance_nota(&actor, id, request.payment_reference)
        .await?;
    Ok(Json(nota))
}

pub async fn reconciliation_for(
    State(state): State<AppState>,
    Path(id): Path<NotaId>,
) -> Result<Json<ReconciliationItem>, ApiError> {
    Ok(Json(state.service.reconciliation_for(id).await?))
}

/// Closes a reconciliation item within the close threshold
pub async fn close_reconciliation(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NotaId>,
) -> Result<Json<ReconciliationItem>, ApiError> {
    Ok(Json(state.service.close_reconciliation(&actor, id).await?))
}

pub async fn reconciliation_items(
    State(state): State<AppState>,
) -> Result<Json<Vec<ReconciliationItem>>, ApiError> {
    Ok(Json(state.service.reconciliation_items().await?))
}

pub async fn list_adjustments(
    State(state): State<AppState>,
    Path(id): Path<NotaId>,
) -> Result<Json<Vec<DebitCreditNote>>, ApiError> {
    Ok(Json(state.service.adjustments_for(id).await?))
}

/// Drafts a debit or credit note for the nota's residual
pub async fn open_adjustment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<NotaId>,
    Json(request): Json<OpenAdjustmentRequest>,
) -> Result<(StatusCode, Json<DebitCreditNote>), ApiError> {
    request.validate()?;
    let note = state.service.open_adjustment(&actor, id, &request.reason).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn submit_intent(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<PaymentIntentId>,
) -> Result<Json<PaymentIntent>, ApiError> {
    Ok(Json(state.service.submit_intent(&actor, id).await?))
}

/// Approves an intent; waiting receipts are matched against it
pub async fn approve_intent(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<PaymentIntentId>,
) -> Result<Json<PaymentIntent>, ApiError> {
    Ok(Json(state.service.approve_intent(&actor, id).await?))
}

pub async fn reject_intent(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<PaymentIntentId>,
    Json(request): Json<ReasonRequest>,
) -> Result<Json<PaymentIntent>, ApiError> {
    request.validate()?;
    Ok(Json(state.service.reject_intent(&actor, id, &request.reason).await?))
}
