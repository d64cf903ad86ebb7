//! Debtor review handlers

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use validator::Validate;

use core_kernel::{Actor, DebtorId, Money};
use domain_batch::Debtor;

use crate::dto::batches::{DecideDebtorRequest, ReviseDebtorRequest};
use crate::{error::ApiError, AppState};

/// Approves or rejects one debtor
pub async fn decide_debtor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<DebtorId>,
    Json(request): Json<DecideDebtorRequest>,
) -> Result<Json<Debtor>, ApiError> {
    request.validate()?;
    let debtor = state
        .service
        .decide_debtor(&actor, id, request.decision, request.remarks)
        .await?;
    Ok(Json(debtor))
}

/// Corrects a rejected debtor of a reopened batch
pub async fn revise_debtor(
    State(state): State<AppState>,
    Extension(actor): Extension<Actor>,
    Path(id): Path<DebtorId>,
    Json(request): Json<ReviseDebtorRequest>,
) -> Result<Json<Debtor>, ApiError> {
    let currency = request.currency;
    let debtor = state
        .service
        .revise_debtor(
            &actor,
            id,
            Money::new(request.credit_plafond, currency),
            Money::new(request.gross_premium, currency),
            Money::new(request.net_premium, currency),
        )
        .await?;
    Ok(Json(debtor))
}
