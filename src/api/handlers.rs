//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
};
use tracing::error;

use crate::app::AppState;
use crate::domain::{
    AppError, DatabaseError, ErrorDetail, ErrorResponse, ExternalServiceError, HealthResponse,
    HealthStatus,
};

/// Detailed health check
pub async fn health_check_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let health = state.service.health_check().await;
    Json(health)
}

/// Kubernetes liveness probe
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Kubernetes readiness probe
pub async fn readiness_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    let health = state.service.health_check().await;
    match health.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Prometheus scrape endpoint; 404 when no recorder is installed.
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => AppError::NotSupported("metrics recorder is not installed".to_string())
            .into_response_with_status(StatusCode::NOT_FOUND),
    }
}

impl AppError {
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Database(db_err) => match db_err {
                DatabaseError::Connection(_) | DatabaseError::PoolExhausted(_) => {
                    (StatusCode::SERVICE_UNAVAILABLE, "database_error")
                }
                DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
                DatabaseError::Duplicate(_) => (StatusCode::CONFLICT, "duplicate"),
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            AppError::ExternalService(ext_err) => match ext_err {
                ExternalServiceError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
                ExternalServiceError::RateLimited(_) => {
                    (StatusCode::TOO_MANY_REQUESTS, "rate_limited")
                }
                _ => (StatusCode::BAD_GATEWAY, "external_service_error"),
            },
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
            AppError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            AppError::Manifest(_) => (StatusCode::BAD_REQUEST, "manifest_error"),
            AppError::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "serialization_error")
            }
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            AppError::NotSupported(_) => (StatusCode::NOT_IMPLEMENTED, "not_supported"),
        }
    }

    fn into_response_with_status(self, status: StatusCode) -> axum::response::Response {
        let (_, error_type) = self.classify();
        let message = self.to_string();

        if status.is_server_error() {
            error!(error_type = %error_type, message = %message, "Server error");
        }

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                r#type: error_type.to_string(),
                message,
            },
        });

        (status, body).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, _) = self.classify();
        self.into_response_with_status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ManifestError, ValidationError};
    use http_body_util::BodyExt;

    async fn error_body(response: axum::response::Response) -> ErrorResponse {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_error_maps_to_bad_request() {
        let err = AppError::Validation(ValidationError::MissingField("text".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = error_body(response).await;
        assert_eq!(body.error.r#type, "validation_error");
        assert!(body.error.message.contains("text"));
    }

    #[tokio::test]
    async fn test_manifest_error_maps_to_bad_request() {
        let err = AppError::Manifest(ManifestError::MissingField("project.name".to_string()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.error.r#type, "manifest_error");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                AppError::Database(DatabaseError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::Database(DatabaseError::Duplicate("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::Database(DatabaseError::Connection("x".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                AppError::ExternalService(ExternalServiceError::RateLimited("x".into())),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::ExternalService(ExternalServiceError::HttpError("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                AppError::NotSupported("x".into()),
                StatusCode::NOT_IMPLEMENTED,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
