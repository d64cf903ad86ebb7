//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use domain_settlement::{InvalidTransition, WorkflowError};

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A gate, pending review or tolerance check refused the transition
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Validation error")]
    Validation(Vec<String>),
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let (status, error_type, details) = match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request", None),
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden", None),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict", None),
            ApiError::InvalidTransition(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "invalid_transition", None)
            }
            ApiError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None),
            ApiError::Validation(details) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", Some(details))
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        let message = err.to_string();
        match err {
            WorkflowError::GateNotSatisfied(_)
            | WorkflowError::PendingReviewExists(_)
            | WorkflowError::ToleranceExceeded { .. } => ApiError::Conflict(message),
            WorkflowError::InvalidTransition(InvalidTransition::RoleNotPermitted { .. }) => {
                ApiError::Forbidden(message)
            }
            WorkflowError::InvalidTransition(InvalidTransition::State { .. }) => {
                ApiError::InvalidTransition(message)
            }
            WorkflowError::NotFound(_) => ApiError::NotFound(message),
            WorkflowError::Validation(_) | WorkflowError::Money(_) => ApiError::BadRequest(message),
            WorkflowError::Store(e) if e.is_conflict() => ApiError::Conflict(message),
            WorkflowError::Store(_) => ApiError::Store(message),
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| match &e.message {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, e.code),
                })
            })
            .collect();
        details.sort();
        ApiError::Validation(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::{PortError, Role};
    use domain_settlement::Action;

    fn status_of(err: WorkflowError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_workflow_errors_map_to_status() {
        assert_eq!(status_of(WorkflowError::gate("review")), StatusCode::CONFLICT);
        assert_eq!(status_of(WorkflowError::PendingReviewExists(2)), StatusCode::CONFLICT);
        assert_eq!(
            status_of(WorkflowError::ToleranceExceeded {
                difference: "IDR 1".into(),
                allowed: "IDR 0".into()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(WorkflowError::invalid_state("Nota", "Paid", "no successor state")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(WorkflowError::role_not_permitted(Role::Finance, Action::BatchClose)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_of(WorkflowError::validation("month")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(WorkflowError::NotFound("Batch".into())), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_store_conflict_is_retryable_by_client() {
        assert_eq!(
            status_of(WorkflowError::Store(PortError::conflict("stale version"))),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(WorkflowError::Store(PortError::connection("down"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
