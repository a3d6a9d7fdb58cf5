//! Infrastructure layer implementations.

pub mod database;
pub mod logging;
pub mod notifier;
pub mod observability;

pub use database::{PoolConfig, PostgresClient, PostgresRepository, Session};
pub use logging::{LogGuards, LoggingConfig, init_logging, inside_container};
pub use notifier::{LogNotifier, TelegramConfig, TelegramNotifier};
pub use observability::{PrometheusHandle, init_metrics, init_metrics_handle};
