//! HTTP API Layer
//!
//! This crate provides the REST API over the settlement orchestrator using
//! Axum.
//!
//! # Architecture
//!
//! - **Handlers**: one thin handler per orchestrator operation
//! - **Middleware**: actor identification, tracing, request audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: workflow errors mapped onto status codes
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::create_router;
//!
//! let app = create_router(service, config);
//! axum::serve(listener, app).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_settlement::SettlementService;

use crate::config::ApiConfig;
use crate::handlers::{adjustments, audit, batches, claims, debtors, health, notas, payments};
use crate::middleware::{actor_middleware, audit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: SettlementService,
    pub config: ApiConfig,
}

/// Creates the main API router
///
/// Everything under `/api/v1` requires the actor headers.
pub fn create_router(service: SettlementService, config: ApiConfig) -> Router {
    let state = AppState { service, config };

    // Public routes (no actor required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let batch_routes = Router::new()
        .route("/", post(batches::ingest_batch).get(batches::list_batches))
        .route("/:id", get(batches::get_batch))
        .route("/:id/advance", post(batches::advance_batch))
        .route("/:id/close", post(batches::close_batch))
        .route("/:id/reject", post(batches::reject_batch))
        .route("/:id/reopen", post(batches::request_reopen))
        .route("/:id/reopen/resolve", post(batches::resolve_reopen))
        .route("/:id/debtors", get(batches::list_debtors))
        .route("/:id/decisions", post(batches::bulk_decide))
        .route("/:id/notas", post(batches::create_nota).get(batches::list_notas))
        .route("/:id/claims", get(batches::list_claims));

    let debtor_routes = Router::new()
        .route("/:id/decision", post(debtors::decide_debtor))
        .route("/:id/revision", post(debtors::revise_debtor));

    let nota_routes = Router::new()
        .route("/:id", get(notas::get_nota))
        .route("/:id/advance", post(notas::advance_nota))
        .route("/:id/reconciliation", get(notas::reconciliation_for))
        .route("/:id/reconciliation/close", post(notas::close_reconciliation))
        .route(
            "/:id/adjustments",
            post(notas::open_adjustment).get(notas::list_adjustments),
        );

    let intent_routes = Router::new()
        .route("/:id/submit", post(notas::submit_intent))
        .route("/:id/approve", post(notas::approve_intent))
        .route("/:id/reject", post(notas::reject_intent));

    let payment_routes = Router::new()
        .route("/", post(payments::record_payment).get(payments::unmatched_payments))
        .route("/:id", get(payments::get_payment))
        .route("/:id/match", post(payments::match_payment));

    let reconciliation_routes = Router::new()
        .route("/", get(notas::reconciliation_items))
        .route("/auto-match", post(payments::run_auto_match));

    let adjustment_routes = Router::new()
        .route("/:id/submit", post(adjustments::submit_adjustment))
        .route("/:id/review", post(adjustments::review_adjustment))
        .route("/:id/acknowledge", post(adjustments::acknowledge_adjustment));

    let claim_routes = Router::new()
        .route("/", post(claims::create_claim))
        .route("/:id", get(claims::get_claim))
        .route("/:id/submit", post(claims::submit_claim))
        .route("/:id/approve", post(claims::approve_claim))
        .route("/:id/reject", post(claims::reject_claim));

    // Actor-bound API routes
    let api_routes = Router::new()
        .nest("/batches", batch_routes)
        .nest("/debtors", debtor_routes)
        .nest("/notas", nota_routes)
        .nest("/intents", intent_routes)
        .nest("/payments", payment_routes)
        .nest("/reconciliation", reconciliation_routes)
        .nest("/adjustments", adjustment_routes)
        .nest("/claims", claim_routes)
        .route("/audit/:entity_type/:entity_id", get(audit::audit_for))
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn(actor_middleware));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
