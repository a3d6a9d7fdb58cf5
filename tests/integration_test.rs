//! Integration tests for the API.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use clean_architecture_boilerplate::api::create_router;
use clean_architecture_boilerplate::app::{AppState, HealthMonitorJob, PeriodicJob};
use clean_architecture_boilerplate::domain::{ErrorResponse, HealthResponse, HealthStatus};
use clean_architecture_boilerplate::test_utils::{MockDatabaseClient, MockNotifier};

fn create_test_state() -> (Arc<AppState>, Arc<MockDatabaseClient>, Arc<MockNotifier>) {
    let db = Arc::new(MockDatabaseClient::new());
    let notifier = Arc::new(MockNotifier::new());
    let state = Arc::new(AppState::new(
        Arc::clone(&db) as _,
        Arc::clone(&notifier) as _,
    ));
    (state, db, notifier)
}

async fn get(state: Arc<AppState>, uri: &str) -> axum::response::Response {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    create_router(state).oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_health_check_healthy() {
    let (state, _, _) = create_test_state();

    let response = get(state, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let health: HealthResponse = serde_json::from_slice(&body_bytes).unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.database, HealthStatus::Healthy);
    assert_eq!(health.notifier, HealthStatus::Healthy);
}

#[tokio::test]
async fn test_health_check_unhealthy_database() {
    let (state, db, _) = create_test_state();
    db.set_healthy(false);

    let response = get(state, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let health: HealthResponse = serde_json::from_slice(&body_bytes).unwrap();
    assert_eq!(health.status, HealthStatus::Unhealthy);
    assert_eq!(health.database, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_liveness_ignores_dependencies() {
    let (state, db, notifier) = create_test_state();
    db.set_healthy(false);
    notifier.set_healthy(false);

    let response = get(state, "/health/live").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(db.call_count(), 0);
}

#[tokio::test]
async fn test_readiness_degraded_is_ready() {
    let (state, _, notifier) = create_test_state();
    notifier.set_healthy(false);

    let response = get(state, "/health/ready").await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_readiness_unhealthy_is_unavailable() {
    let (state, db, _) = create_test_state();
    db.set_healthy(false);

    let response = get(state, "/health/ready").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_disabled_returns_error_body() {
    let (state, _, _) = create_test_state();

    let response = get(state, "/metrics").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let error: ErrorResponse = serde_json::from_slice(&body_bytes).unwrap();
    assert_eq!(error.error.r#type, "not_supported");
}

#[tokio::test]
async fn test_health_monitor_reports_outage_and_recovery() {
    let (state, db, notifier) = create_test_state();
    let job = HealthMonitorJob::new(Arc::clone(&state.service));

    job.run().await.unwrap();
    db.set_healthy(false);
    job.run().await.unwrap();
    db.set_healthy(true);
    job.run().await.unwrap();

    let sent = notifier.sent_messages();
    assert_eq!(sent.len(), 2);
    assert!(sent[0].starts_with("Health status changed: healthy -> unhealthy"));
    assert!(sent[1].starts_with("Health status changed: unhealthy -> healthy"));
}
