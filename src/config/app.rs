use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use validator::Validate;

use super::{EnvReader, process_env};
use crate::domain::AppError;

/// Process-level settings for the server binary.
#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub log_dir: PathBuf,
    pub log_name: String,
    /// Default console filter when `RUST_LOG` is unset.
    pub log_level: String,
    #[validate(range(min = 1))]
    pub log_retention: usize,
    #[validate(range(min = 1))]
    pub health_interval_secs: u64,
    pub health_monitor: bool,
}

impl AppConfig {
    pub const ENV_PREFIX: &'static str = "APP_";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(Self::ENV_PREFIX, &lookup);
        let config = Self {
            bind_addr: env.parse_or("bind_addr", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            log_dir: PathBuf::from(env.string_or("log_dir", "logs")),
            log_name: env.string_or("log_name", "app"),
            log_level: env.string_or("log_level", "info"),
            log_retention: env.parse_or("log_retention", 5)?,
            health_interval_secs: env.parse_or("health_interval_secs", 60)?,
            health_monitor: env.flag_or("health_monitor", true)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }
}
