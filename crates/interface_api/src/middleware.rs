//! API middleware

use axum::{
    body::Body,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::{info, warn};

use core_kernel::Actor;

use crate::auth::actor_from_headers;
use crate::error::ApiError;

/// Identifies the acting user
///
/// Reads the actor headers and adds the [`Actor`] to request extensions.
pub async fn actor_middleware(mut request: Request<Body>, next: Next) -> Response {
    match actor_from_headers(request.headers()) {
        Ok(actor) => {
            request.extensions_mut().insert(actor);
            next.run(request).await
        }
        Err(e) => {
            warn!(uri = %request.uri(), error = %e, "request without a valid actor");
            ApiError::Unauthorized(e.to_string()).into_response()
        }
    }
}

/// Audit logging middleware
///
/// Logs every API request with its actor, status and latency. Workflow
/// decisions are audited by the orchestrator itself.
pub async fn audit_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let (actor, role) = request
        .extensions()
        .get::<Actor>()
        .map(|a| (a.email.clone(), a.role.to_string()))
        .unwrap_or_else(|| ("anonymous".to_string(), "-".to_string()));

    let start = Utc::now();

    let response = next.run(request).await;

    let duration = Utc::now() - start;
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        actor = %actor,
        role = %role,
        status = %status.as_u16(),
        duration_ms = duration.num_milliseconds(),
        "API request"
    );

    response
}
