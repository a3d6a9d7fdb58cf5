//! Notification channel implementations.

pub mod telegram;

use async_trait::async_trait;
use tracing::{info, instrument};

use crate::domain::{AppError, Notifier};

pub use telegram::{TelegramConfig, TelegramNotifier};

/// Notifier that only writes messages to the log. Used when no chat
/// channel is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    #[instrument(skip(self, text))]
    async fn send(&self, text: &str) -> Result<(), AppError> {
        info!(message = %text, "Notification");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        assert!(notifier.send("hello").await.is_ok());
        assert!(notifier.health_check().await.is_ok());
    }
}
