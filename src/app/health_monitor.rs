//! Periodic health check that reports status transitions.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{info, instrument};

use super::service::AppService;
use super::worker::PeriodicJob;
use crate::domain::{AppError, HealthResponse, HealthStatus};

/// Notifies when the overall health status changes. The first observation
/// only establishes the baseline.
pub struct HealthMonitorJob {
    service: Arc<AppService>,
    last_status: Mutex<Option<HealthStatus>>,
}

impl HealthMonitorJob {
    pub fn new(service: Arc<AppService>) -> Self {
        Self {
            service,
            last_status: Mutex::new(None),
        }
    }

    pub fn last_status(&self) -> Option<HealthStatus> {
        self.last_status.lock().map(|s| *s).unwrap_or(None)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<HealthStatus>> {
        match self.last_status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns the previous status when `current` differs from it. The first
    /// observation is stored immediately and reports nothing.
    fn transition(&self, current: HealthStatus) -> Option<HealthStatus> {
        let mut last = self.lock();
        match *last {
            None => {
                *last = Some(current);
                None
            }
            Some(previous) if previous != current => Some(previous),
            Some(_) => None,
        }
    }

    fn record(&self, current: HealthStatus) {
        *self.lock() = Some(current);
    }
}

fn transition_message(previous: HealthStatus, health: &HealthResponse) -> String {
    format!(
        "Health status changed: {previous} -> {} (database: {}, notifier: {})",
        health.status, health.database, health.notifier
    )
}

#[async_trait]
impl PeriodicJob for HealthMonitorJob {
    fn name(&self) -> &str {
        "health_monitor"
    }

    #[instrument(skip(self))]
    async fn run(&self) -> Result<(), AppError> {
        let health = self.service.health_check().await;
        if let Some(previous) = self.transition(health.status) {
            info!(from = %previous, to = %health.status, "Health status changed");
            // Unreported transitions are retried on the next run.
            self.service
                .notify(&transition_message(previous, &health))
                .await?;
            self.record(health.status);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExternalServiceError, Notifier};
    use crate::test_utils::{MockDatabaseClient, MockNotifier};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` sends, then delivers.
    struct FlakyNotifier {
        failures: AtomicU32,
        inner: MockNotifier,
    }

    #[async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, text: &str) -> Result<(), AppError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ExternalServiceError::Unavailable("flaky".to_string()).into());
            }
            self.inner.send(text).await
        }

        async fn health_check(&self) -> Result<(), AppError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_notifies_only_on_transition() {
        let db = Arc::new(MockDatabaseClient::new());
        let notifier = Arc::new(MockNotifier::new());
        let service = Arc::new(AppService::new(db.clone(), notifier.clone()));
        let job = HealthMonitorJob::new(service);

        job.run().await.unwrap();
        assert_eq!(job.last_status(), Some(HealthStatus::Healthy));
        assert!(notifier.sent_messages().is_empty());

        job.run().await.unwrap();
        assert!(notifier.sent_messages().is_empty());

        db.set_healthy(false);
        job.run().await.unwrap();
        let sent = notifier.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("healthy -> unhealthy"));

        db.set_healthy(true);
        job.run().await.unwrap();
        assert_eq!(notifier.sent_messages().len(), 2);
    }

    #[tokio::test]
    async fn test_first_observation_does_not_notify() {
        let db = Arc::new(MockDatabaseClient::new());
        db.set_healthy(false);
        let notifier = Arc::new(MockNotifier::new());
        let job = HealthMonitorJob::new(Arc::new(AppService::new(db, notifier.clone())));

        job.run().await.unwrap();
        assert_eq!(job.last_status(), Some(HealthStatus::Unhealthy));
        assert!(notifier.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_failed_notification_is_retried() {
        let db = Arc::new(MockDatabaseClient::new());
        let notifier = Arc::new(FlakyNotifier {
            failures: AtomicU32::new(1),
            inner: MockNotifier::new(),
        });
        let job = HealthMonitorJob::new(Arc::new(AppService::new(db.clone(), notifier.clone())));

        job.run().await.unwrap();
        db.set_healthy(false);
        assert!(job.run().await.is_err());
        assert_eq!(job.last_status(), Some(HealthStatus::Healthy));

        job.run().await.unwrap();
        job.run().await.unwrap();
        let sent = notifier.inner.sent_messages();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("healthy -> unhealthy"));
        assert_eq!(job.last_status(), Some(HealthStatus::Unhealthy));
    }
}
