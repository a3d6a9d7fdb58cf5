//! Application service layer.
//!
//! This module contains the core logic that orchestrates operations between
//! infrastructure components using trait abstractions.

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::{
    AppError, DatabaseClient, HealthResponse, HealthStatus, Notifier, ValidationError,
};

/// Longest message the Bot API accepts.
pub const MAX_NOTIFICATION_LEN: usize = 4096;

/// Application service containing core logic.
///
/// Holds the database and notification channel behind trait objects so
/// handlers and jobs can be exercised against mocks.
///
/// # Example
///
/// ```ignore
/// let db = Arc::new(PostgresClient::connect(&settings, PoolConfig::default()).await?);
/// let notifier = Arc::new(TelegramNotifier::with_defaults(&telegram)?);
/// let service = AppService::new(db, notifier);
///
/// let health = service.health_check().await;
/// ```
pub struct AppService {
    db_client: Arc<dyn DatabaseClient>,
    notifier: Arc<dyn Notifier>,
}

impl AppService {
    #[must_use]
    pub fn new(db_client: Arc<dyn DatabaseClient>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            db_client,
            notifier,
        }
    }

    /// Performs a health check on all dependencies.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> HealthResponse {
        let db_health = match self.db_client.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Database health check failed");
                HealthStatus::Unhealthy
            }
        };

        let notifier_health = match self.notifier.health_check().await {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => {
                warn!(error = ?e, "Notifier health check failed");
                HealthStatus::Unhealthy
            }
        };

        HealthResponse::new(db_health, notifier_health)
    }

    /// Sends a message through the configured notifier.
    ///
    /// # Errors
    ///
    /// Returns a validation error for empty or oversized text, or the
    /// notifier's error when delivery fails.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn notify(&self, text: &str) -> Result<(), AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::MissingField("text".to_string()).into());
        }
        if text.chars().count() > MAX_NOTIFICATION_LEN {
            return Err(ValidationError::InvalidField {
                field: "text".to_string(),
                message: format!("longer than {MAX_NOTIFICATION_LEN} characters"),
            }
            .into());
        }
        self.notifier.send(text).await?;
        info!("Notification delivered");
        Ok(())
    }
}
