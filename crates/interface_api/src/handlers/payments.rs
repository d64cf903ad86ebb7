//! Payment handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, PaymentId};
use domain_billing::Payment;
use domain_settlement::AutoMatchReport;

use crate::dto::billing::{MatchPaymentRequest, RecordPaymentRequest};
use crate::{error::ApiError, AppState};

/// Records a bank receipt and tries to match it
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<Payment>), ApiError> {
    request.validate()?;
    let payment = state.service.record_payment(&actor, request.into()).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

pub async fn get_payment(
    State(state): State<AppState>,
    Path(id): Path<PaymentId>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.service.get_payment(id).await?))
}

pub async fn unmatched_payments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    Ok(Json(state.service.unmatched_payments().await?))
}

/// Ties a payment to an intent chosen by the operator
pub async fn match_payment(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<PaymentId>,
    Json(request): Json<MatchPaymentRequest>,
) -> Result<Json<Payment>, ApiError> {
    Ok(Json(state.service.match_payment(&actor, id, request.intent_id).await?))
}

pub async fn run_auto_match(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<AutoMatchReport>, ApiError> {
    Ok(Json(state.service.run_auto_match(&actor).await?))
}
