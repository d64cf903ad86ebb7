//! HTTP API Tests
//!
//! Drive the router in-process with `oneshot` against an in-memory backend.

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use core_kernel::BatchId;
use interface_api::config::ApiConfig;
use interface_api::create_router;
use test_utils::{IdFixtures, SettlementHarness};

fn app(harness: &SettlementHarness) -> Router {
    create_router(harness.service.clone(), ApiConfig::default())
}

async fn send(
    app: Router,
    method: Method,
    uri: &str,
    role: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(role) = role {
        builder = builder
            .header("x-actor-email", format!("{}@reinsurer.co.id", role))
            .header("x-actor-role", role);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn upload_body() -> Value {
    json!({
        "contract_id": IdFixtures::contract_id(),
        "contract_reference": "TREATY-QS-2024",
        "month": 3,
        "year": 2024,
        "currency": "IDR",
        "debtors": [
            {"name": "PT Maju", "credit_plafond": "500000000", "gross_premium": "1200000", "net_premium": "1000000"},
            {"name": "PT Sejahtera", "credit_plafond": "300000000", "gross_premium": "600000", "net_premium": "500000"}
        ]
    })
}

#[tokio::test]
async fn test_health_needs_no_actor() {
    let harness = SettlementHarness::new();

    let (status, body) = send(app(&harness), Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_readiness_reports_tolerance_settings() {
    let harness = SettlementHarness::new();

    let (status, body) = send(app(&harness), Method::GET, "/health/ready", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
    assert_eq!(body["currency"], "IDR");
    assert_eq!(body["close_threshold"], "100000");
}

#[tokio::test]
async fn test_missing_actor_is_unauthorized() {
    let harness = SettlementHarness::new();

    let (status, body) = send(app(&harness), Method::GET, "/api/v1/batches", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn test_branch_uploads_batch() {
    let harness = SettlementHarness::new();

    let (status, batch) = send(
        app(&harness),
        Method::POST,
        "/api/v1/batches",
        Some("branch_operator"),
        Some(upload_body()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(batch["status"], "Uploaded");

    let uri = format!("/api/v1/batches/{}", batch["id"].as_str().unwrap());
    let (status, detail) = send(app(&harness), Method::GET, &uri, Some("underwriter"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["progress"]["total"], 2);
    assert_eq!(detail["progress"]["pending"], 2);
}

#[tokio::test]
async fn test_finance_cannot_upload() {
    let harness = SettlementHarness::new();

    let (status, body) = send(
        app(&harness),
        Method::POST,
        "/api/v1/batches",
        Some("finance"),
        Some(upload_body()),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");
}

#[tokio::test]
async fn test_blank_debtor_name_fails_validation() {
    let harness = SettlementHarness::new();
    let mut body = upload_body();
    body["debtors"][0]["name"] = json!("");

    let (status, body) = send(
        app(&harness),
        Method::POST,
        "/api/v1/batches",
        Some("branch_operator"),
        Some(body),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(harness.service.list_batches().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_nota_before_review_is_a_conflict() {
    let harness = SettlementHarness::new();
    let (batch, _) = harness.matched_batch(&[dec!(1000000)]).await;

    let uri = format!("/api/v1/batches/{}/notas", batch.id);
    let (status, body) = send(app(&harness), Method::POST, &uri, Some("finance"), None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");
}

#[tokio::test]
async fn test_unknown_batch_is_not_found() {
    let harness = SettlementHarness::new();

    let uri = format!("/api/v1/batches/{}", BatchId::new());
    let (status, _) = send(app(&harness), Method::GET, &uri, Some("underwriter"), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_marking_nota_paid_closes_reconciliation() {
    let harness = SettlementHarness::new();
    let (_, nota) = harness.confirmed_nota(&[dec!(4000000), dec!(6000000)]).await;

    let uri = format!("/api/v1/notas/{}/advance", nota.id);
    let (status, paid) = send(
        app(&harness),
        Method::POST,
        &uri,
        Some("finance"),
        Some(json!({"payment_reference": "TRX-2024-0042"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "Paid");
    assert_eq!(paid["payment_reference"], "TRX-2024-0042");

    let uri = format!("/api/v1/notas/{}/reconciliation", nota.id);
    let (status, item) = send(app(&harness), Method::GET, &uri, Some("finance"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(item["status"], "Closed");

    let uri = format!("/api/v1/notas/{}/advance", nota.id);
    let (status, body) = send(app(&harness), Method::POST, &uri, Some("finance"), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn test_audit_trail_is_readable() {
    let harness = SettlementHarness::new();
    let (_, nota) = harness.confirmed_nota(&[dec!(2000000)]).await;

    let uri = format!("/api/v1/audit/Nota/{}", nota.id);
    let (status, entries) = send(app(&harness), Method::GET, &uri, Some("manager"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert!(entries.as_array().unwrap().len() >= 3);
}
