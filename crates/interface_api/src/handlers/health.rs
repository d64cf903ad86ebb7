//! Liveness and readiness probes

use axum::{extract::State, http::StatusCode, Json};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use core_kernel::Currency;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Readiness also reports the settlement settings the service runs with
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub currency: Currency,
    pub tolerance_rate: Decimal,
    pub tolerance_floor: Decimal,
    pub close_threshold: Decimal,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Ready once the entity store answers a read
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, StatusCode> {
    if let Err(e) = state.service.list_batches().await {
        warn!(error = %e, "entity store not ready");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let settlement = state.service.config();
    Ok(Json(ReadinessResponse {
        status: "ready",
        version: env!("CARGO_PKG_VERSION"),
        currency: settlement.currency,
        tolerance_rate: settlement.tolerance_rate,
        tolerance_floor: settlement.tolerance_floor,
        close_threshold: settlement.close_threshold,
    }))
}
