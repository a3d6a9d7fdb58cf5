use secrecy::{ExposeSecret, SecretString};
use validator::Validate;

use super::{EnvReader, encode_credential, process_env};
use crate::domain::AppError;

#[derive(Debug, Clone, Validate)]
pub struct PostgresSettings {
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u32,
    pub user: String,
    pub password: SecretString,
    pub database: String,
    /// Reported to the server as `application_name`.
    pub app_name: String,
    /// Enables statement logging.
    pub debug: bool,
}

impl PostgresSettings {
    pub const ENV_PREFIX: &'static str = "POSTGRES_";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(Self::ENV_PREFIX, &lookup);
        let settings = Self {
            host: env.string_or("host", "localhost"),
            port: env.parse_or("port", 5432)?,
            user: env.required("user")?,
            password: env.secret("password")?,
            database: env.required("database")?,
            app_name: env.string_or("app_name", ""),
            debug: env.flag_or("debug", false)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn url(&self) -> SecretString {
        SecretString::from(format!(
            "postgresql://{}:{}@{}:{}/{}",
            encode_credential(&self.user),
            encode_credential(self.password.expose_secret()),
            self.host,
            self.port,
            self.database
        ))
    }
}

#[derive(Debug, Clone, Validate)]
pub struct MariadbSettings {
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u32,
    pub user: String,
    pub password: SecretString,
    pub database: String,
    pub debug: bool,
}

impl MariadbSettings {
    pub const ENV_PREFIX: &'static str = "MARIADB_";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(Self::ENV_PREFIX, &lookup);
        let settings = Self {
            host: env.string_or("host", "localhost"),
            port: env.parse_or("port", 3306)?,
            user: env.required("user")?,
            password: env.secret("password")?,
            database: env.required("database")?,
            debug: env.flag_or("debug", false)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn url(&self) -> SecretString {
        SecretString::from(format!(
            "mariadb://{}:{}@{}:{}/{}",
            encode_credential(&self.user),
            encode_credential(self.password.expose_secret()),
            self.host,
            self.port,
            self.database
        ))
    }
}

#[derive(Debug, Clone, Validate)]
pub struct RabbitmqSettings {
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u32,
    pub user: String,
    pub password: SecretString,
    pub tls: bool,
}

impl RabbitmqSettings {
    pub const ENV_PREFIX: &'static str = "RABBITMQ_";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(Self::ENV_PREFIX, &lookup);
        let settings = Self {
            host: env.string_or("host", "localhost"),
            port: env.parse_or("port", 5672)?,
            user: env.required("user")?,
            password: env.secret("password")?,
            tls: env.flag_or("tls", false)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// AMQP URL on the default vhost.
    pub fn url(&self) -> SecretString {
        let scheme = if self.tls { "amqps" } else { "amqp" };
        SecretString::from(format!(
            "{scheme}://{}:{}@{}:{}//",
            encode_credential(&self.user),
            encode_credential(self.password.expose_secret()),
            self.host,
            self.port
        ))
    }
}

#[derive(Debug, Clone, Validate)]
pub struct RedisSettings {
    pub host: String,
    #[validate(range(min = 1, max = 65535))]
    pub port: u32,
    pub password: SecretString,
    pub tls: bool,
}

impl RedisSettings {
    pub const ENV_PREFIX: &'static str = "REDIS_";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(Self::ENV_PREFIX, &lookup);
        let settings = Self {
            host: env.string_or("host", "localhost"),
            port: env.parse_or("port", 6379)?,
            password: env.secret("password")?,
            tls: env.flag_or("tls", false)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// URL for logical database 0.
    pub fn url(&self) -> SecretString {
        let scheme = if self.tls { "rediss" } else { "redis" };
        SecretString::from(format!(
            "{scheme}://:{}@{}:{}/0",
            encode_credential(self.password.expose_secret()),
            self.host,
            self.port
        ))
    }
}

#[derive(Debug, Clone)]
pub struct TelegramSettings {
    pub bot_token: SecretString,
    pub chat_id: String,
    pub api_base: String,
}

impl TelegramSettings {
    pub const ENV_PREFIX: &'static str = "TELEGRAM_";
    pub const DEFAULT_API_BASE: &'static str = "https://api.telegram.org";

    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(process_env)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader::new(Self::ENV_PREFIX, &lookup);
        Ok(Self {
            bot_token: env.secret("bot_token")?,
            chat_id: env.required("chat_id")?,
            api_base: env
                .string_or("api_base", Self::DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}
