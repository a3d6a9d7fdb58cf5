//! Structured logging setup.
//!
//! Three sinks are installed:
//! - console, filtered by `RUST_LOG` (falls back to the configured level),
//!   without timestamps when running inside a container;
//! - `<dir>/<name>-error.<date>.log` with ERROR events as plain text;
//! - `<dir>/<name>.<date>.log` with INFO and above as JSON lines.
//!
//! Files rotate daily by date, not by size, and rotated files stay
//! uncompressed. Only the newest `retention` files per sink are kept.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::AppConfig;
use crate::domain::AppError;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub directory: PathBuf,
    pub file_name: String,
    pub console_level: String,
    pub retention: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            file_name: "app".to_string(),
            console_level: "info".to_string(),
            retention: 5,
        }
    }
}

impl From<&AppConfig> for LoggingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            directory: config.log_dir.clone(),
            file_name: config.log_name.clone(),
            console_level: config.log_level.clone(),
            retention: config.log_retention,
        }
    }
}

/// Flushes the file writers when dropped; hold it for the life of the process.
#[must_use = "dropping the guards stops file logging"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// True when `<root>/.dockerenv` or `<root>/run/.containerenv` exists.
pub fn inside_container(root: &Path) -> bool {
    root.join(".dockerenv").is_file() || root.join("run/.containerenv").is_file()
}

/// Daily appender writing `<dir>/<prefix>.<YYYY-MM-DD>.log` as plain text.
fn rolling_file(config: &LoggingConfig, prefix: String) -> Result<RollingFileAppender, AppError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(config.retention.max(1))
        .build(&config.directory)
        .map_err(|e| AppError::Internal(format!("log file setup failed: {e}")))
}

/// Install the global subscriber.
///
/// # Errors
/// Fails when the log directory cannot be created or a global subscriber
/// is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<LogGuards, AppError> {
    std::fs::create_dir_all(&config.directory).map_err(|e| {
        AppError::Internal(format!(
            "cannot create log directory {}: {e}",
            config.directory.display()
        ))
    })?;

    let (error_writer, error_guard) =
        tracing_appender::non_blocking(rolling_file(config, format!("{}-error", config.file_name))?);
    let (json_writer, json_guard) =
        tracing_appender::non_blocking(rolling_file(config, config.file_name.clone())?);

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.console_level));
    let console_layer = if inside_container(Path::new("/")) {
        fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .without_time()
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .with_filter(console_filter)
            .boxed()
    };

    let error_layer = fmt::layer()
        .with_writer(error_writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::ERROR);

    let json_layer = fmt::layer()
        .json()
        .with_writer(json_writer)
        .with_ansi(false)
        .with_current_span(true)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(error_layer)
        .with(json_layer)
        .try_init()
        .map_err(|e| AppError::Internal(format!("logging already initialised: {e}")))?;

    Ok(LogGuards {
        _guards: vec![error_guard, json_guard],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inside_container_detects_marker_files() {
        let root = tempfile::tempdir().unwrap();
        assert!(!inside_container(root.path()));

        std::fs::create_dir_all(root.path().join("run")).unwrap();
        std::fs::write(root.path().join("run/.containerenv"), "").unwrap();
        assert!(inside_container(root.path()));

        let docker = tempfile::tempdir().unwrap();
        std::fs::write(docker.path().join(".dockerenv"), "").unwrap();
        assert!(inside_container(docker.path()));
    }

    #[test]
    fn test_logging_config_from_app_config() {
        let app = AppConfig::from_lookup(|key| match key {
            "APP_LOG_NAME" => Some("worker".to_string()),
            "APP_LOG_RETENTION" => Some("3".to_string()),
            _ => None,
        })
        .unwrap();
        let config = LoggingConfig::from(&app);
        assert_eq!(config.file_name, "worker");
        assert_eq!(config.retention, 3);
        assert_eq!(config.directory, PathBuf::from("logs"));
    }

    #[test]
    fn test_rolling_file_writes_plain_dated_file() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().to_path_buf(),
            ..LoggingConfig::default()
        };

        let mut appender = rolling_file(&config, "app".to_string()).unwrap();
        appender.write_all(b"started\n").unwrap();
        appender.flush().unwrap();

        let files: Vec<PathBuf> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(files.len(), 1);
        let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app.") && name.ends_with(".log"), "{name}");
        assert_eq!(std::fs::read_to_string(&files[0]).unwrap(), "started\n");
    }
}
