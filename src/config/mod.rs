//! Typed settings loaded from environment variables.
//!
//! Each service has its own prefix (`POSTGRES_`, `REDIS_`, ...). Values are
//! read through a lookup function so tests can supply a map instead of the
//! process environment; [`load_dotenv`] merges a `.env` file first.

mod app;
mod services;

use std::fmt::Display;
use std::str::FromStr;
use std::sync::OnceLock;

use secrecy::SecretString;

use crate::domain::{AppError, ConfigError};

pub use app::AppConfig;
pub use services::{
    MariadbSettings, PostgresSettings, RabbitmqSettings, RedisSettings, TelegramSettings,
};

/// Loads `.env` from the working directory if present.
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

pub(crate) fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Prefixed reader over a lookup function.
pub(crate) struct EnvReader<'a> {
    prefix: &'static str,
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl<'a> EnvReader<'a> {
    pub(crate) fn new(prefix: &'static str, lookup: &'a dyn Fn(&str) -> Option<String>) -> Self {
        Self { prefix, lookup }
    }

    fn key(&self, field: &str) -> String {
        format!("{}{}", self.prefix, field.to_ascii_uppercase())
    }

    pub(crate) fn optional(&self, field: &str) -> Option<String> {
        (self.lookup)(&self.key(field))
    }

    pub(crate) fn required(&self, field: &str) -> Result<String, ConfigError> {
        self.optional(field)
            .ok_or_else(|| ConfigError::MissingEnvVar(self.key(field)))
    }

    pub(crate) fn secret(&self, field: &str) -> Result<SecretString, ConfigError> {
        self.required(field).map(SecretString::from)
    }

    pub(crate) fn string_or(&self, field: &str, default: &str) -> String {
        self.optional(field).unwrap_or_else(|| default.to_string())
    }

    pub(crate) fn parse_or<T>(&self, field: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        match self.optional(field) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: self.key(field),
                message: e.to_string(),
            }),
        }
    }

    pub(crate) fn flag_or(&self, field: &str, default: bool) -> Result<bool, ConfigError> {
        match self.optional(field) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => Err(ConfigError::InvalidValue {
                    key: self.key(field),
                    message: format!("'{other}' is not a boolean"),
                }),
            },
        }
    }
}

/// Form-encodes a URL credential (space becomes `+`).
pub(crate) fn encode_credential(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Returns the cached value, loading it on first success.
fn cached<T>(
    cell: &'static OnceLock<T>,
    load: impl FnOnce() -> Result<T, AppError>,
) -> Result<&'static T, AppError> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = load()?;
    Ok(cell.get_or_init(|| value))
}

pub fn postgres_settings() -> Result<&'static PostgresSettings, AppError> {
    static CELL: OnceLock<PostgresSettings> = OnceLock::new();
    cached(&CELL, PostgresSettings::from_env)
}

pub fn mariadb_settings() -> Result<&'static MariadbSettings, AppError> {
    static CELL: OnceLock<MariadbSettings> = OnceLock::new();
    cached(&CELL, MariadbSettings::from_env)
}

pub fn rabbitmq_settings() -> Result<&'static RabbitmqSettings, AppError> {
    static CELL: OnceLock<RabbitmqSettings> = OnceLock::new();
    cached(&CELL, RabbitmqSettings::from_env)
}

pub fn redis_settings() -> Result<&'static RedisSettings, AppError> {
    static CELL: OnceLock<RedisSettings> = OnceLock::new();
    cached(&CELL, RedisSettings::from_env)
}

pub fn telegram_settings() -> Result<&'static TelegramSettings, AppError> {
    static CELL: OnceLock<TelegramSettings> = OnceLock::new();
    cached(&CELL, TelegramSettings::from_env)
}

pub fn app_config() -> Result<&'static AppConfig, AppError> {
    static CELL: OnceLock<AppConfig> = OnceLock::new();
    cached(&CELL, AppConfig::from_env)
}

#[cfg(test)]
pub(crate) mod test_env {
    use std::collections::HashMap;

    /// Lookup over fixed pairs.
    pub fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reader_prefixes_keys() {
        let lookup = test_env::lookup(&[("REDIS_PORT", "6380")]);
        let reader = EnvReader::new("REDIS_", &lookup);
        assert_eq!(reader.parse_or("port", 6379_u32).unwrap(), 6380);
        assert_eq!(reader.string_or("host", "localhost"), "localhost");
    }

    #[test]
    fn test_reader_errors() {
        let lookup = test_env::lookup(&[("APP_DEBUG", "maybe"), ("APP_PORT", "x")]);
        let reader = EnvReader::new("APP_", &lookup);
        assert!(matches!(
            reader.required("user"),
            Err(ConfigError::MissingEnvVar(ref key)) if key == "APP_USER"
        ));
        assert!(matches!(reader.flag_or("debug", false), Err(ConfigError::InvalidValue { .. })));
        assert!(matches!(reader.parse_or("port", 1_u32), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_encode_credential() {
        assert_eq!(encode_credential("p@ss word/1"), "p%40ss+word%2F1");
        assert_eq!(encode_credential("plain"), "plain");
    }
}
