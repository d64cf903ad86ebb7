//! Audit trail handlers

use axum::{
    extract::{Path, State},
    Json,
};

use domain_settlement::AuditEntry;

use crate::{error::ApiError, AppState};

/// Decision trail of one entity, oldest first
pub async fn audit_for(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    Ok(Json(state.service.audit_for(&entity_type, &entity_id).await?))
}
