//! Application state management.
//!
//! This module provides the shared application state that is
//! accessible to all request handlers via Axum's State extractor.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::domain::{DatabaseClient, Notifier};

use super::service::AppService;

/// Shared application state for the Axum web server.
///
/// All contained types are wrapped in `Arc` and implement `Send + Sync`,
/// making `AppState` safe to share across async tasks.
#[derive(Clone)]
pub struct AppState {
    /// The application service containing core logic.
    pub service: Arc<AppService>,

    /// Prometheus handle; `None` when no recorder is installed.
    pub metrics: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    /// Creates a new `AppState`, wiring an `AppService` to the given clients.
    #[must_use]
    pub fn new(db_client: Arc<dyn DatabaseClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            service: Arc::new(AppService::new(db_client, notifier)),
            metrics: None,
        }
    }

    /// Attaches the metrics handle rendered by `GET /metrics`.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Option<Arc<PrometheusHandle>>) -> Self {
        self.metrics = metrics;
        self
    }
}
