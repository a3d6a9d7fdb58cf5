//! PostgreSQL database client implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, instrument};

use super::repository::{PostgresRepository, SharedTransaction};
use crate::config::PostgresSettings;
use crate::domain::{AppError, ConfigError, DatabaseClient, DatabaseError, Model};

/// PostgreSQL connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Connections the pool is sized for under normal load.
    pub pool_size: u32,
    /// Extra connections allowed during bursts.
    pub max_overflow: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Ping connections before handing them out.
    pub pre_ping: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_overflow: 10,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
            pre_ping: true,
        }
    }
}

impl PoolConfig {
    pub fn max_connections(&self) -> u32 {
        self.pool_size + self.max_overflow
    }
}

/// PostgreSQL database client with connection pooling
#[derive(Clone)]
pub struct PostgresClient {
    pool: PgPool,
}

impl PostgresClient {
    /// Connect using typed settings.
    pub async fn connect(settings: &PostgresSettings, config: PoolConfig) -> Result<Self, AppError> {
        let port = u16::try_from(settings.port).map_err(|_| ConfigError::InvalidValue {
            key: "POSTGRES_PORT".to_string(),
            message: format!("{} is not a valid port", settings.port),
        })?;

        let mut options = PgConnectOptions::new()
            .host(&settings.host)
            .port(port)
            .username(&settings.user)
            .password(settings.password.expose_secret())
            .database(&settings.database);
        if !settings.app_name.is_empty() {
            options = options.application_name(&settings.app_name);
        }
        if !settings.debug {
            options = options.disable_statement_logging();
        }

        info!(
            host = %settings.host,
            port,
            database = %settings.database,
            max_connections = config.max_connections(),
            "Connecting to PostgreSQL..."
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .test_before_acquire(config.pre_ping)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the migrations found in `dir`.
    pub async fn run_migrations(&self, dir: &Path) -> Result<(), AppError> {
        info!(dir = %dir.display(), "Running database migrations...");
        let migrator = Migrator::new(dir.to_path_buf()).await?;
        migrator.run(&self.pool).await?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying connection pool
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Begin a unit of work.
    pub async fn session(&self) -> Result<Session, AppError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DatabaseError::Transaction(e.to_string()))?;
        Ok(Session {
            tx: Arc::new(Mutex::new(tx)),
        })
    }

    /// Repository for `M` on the shared pool.
    pub fn repository<M: Model>(&self) -> PostgresRepository<M> {
        PostgresRepository::new(self.pool.clone())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }
}

/// A transaction scope. Dropping a session, and every repository taken from
/// it, without [`Session::commit`] rolls it back.
pub struct Session {
    tx: SharedTransaction,
}

impl Session {
    /// Locks the transaction connection for raw statements.
    pub async fn connection(&self) -> MutexGuard<'_, Transaction<'static, Postgres>> {
        self.tx.lock().await
    }

    /// Repository for `M` whose statements run inside this transaction.
    pub fn repository<M: Model>(&self) -> PostgresRepository<M> {
        PostgresRepository::in_session(Arc::clone(&self.tx))
    }

    pub async fn commit(self) -> Result<(), AppError> {
        self.into_transaction()?.commit().await.map_err(|e| {
            error!(error = %e, "Session commit failed, transaction rolled back");
            AppError::Database(DatabaseError::Transaction(e.to_string()))
        })
    }

    pub async fn rollback(self) -> Result<(), AppError> {
        self.into_transaction()?
            .rollback()
            .await
            .map_err(|e| AppError::Database(DatabaseError::Transaction(e.to_string())))
    }

    /// Fails while a repository of this session is still alive.
    fn into_transaction(self) -> Result<Transaction<'static, Postgres>, AppError> {
        Arc::try_unwrap(self.tx)
            .map(Mutex::into_inner)
            .map_err(|_| {
                AppError::Database(DatabaseError::Transaction(
                    "session repositories must be dropped before commit or rollback".to_string(),
                ))
            })
    }
}
