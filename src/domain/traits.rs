//! Domain traits defining contracts for external systems.

use async_trait::async_trait;

use super::error::{AppError, DatabaseError};
use super::filters::Filter;
use super::model::{Model, SqlValue};

/// Database client trait for connectivity checks
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Check database connectivity
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Outbound notification channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a plain-text message
    async fn send(&self, text: &str) -> Result<(), AppError>;

    /// Check that the channel accepts messages
    async fn health_check(&self) -> Result<(), AppError>;
}

/// Generic filtered CRUD over one model.
///
/// Field names passed as filters or criteria must be columns of `M`.
#[async_trait]
pub trait Repository<M: Model>: Send + Sync {
    async fn add(&self, item: M) -> Result<M, AppError>;

    async fn add_many(&self, items: Vec<M>) -> Result<Vec<M>, AppError>;

    /// Fetch by primary key; `NotFound` when absent.
    async fn get(&self, id: SqlValue) -> Result<M, AppError>;

    /// First row whose columns equal every criterion.
    async fn get_one_or_none(&self, criteria: &[(&str, SqlValue)]) -> Result<Option<M>, AppError>;

    async fn get_one(&self, criteria: &[(&str, SqlValue)]) -> Result<M, AppError> {
        self.get_one_or_none(criteria).await?.ok_or_else(|| {
            DatabaseError::NotFound(format!("no {} matches the criteria", M::table_name())).into()
        })
    }

    /// Returns the matching row, or adds `candidate`. The flag is true when
    /// the row was created.
    async fn get_or_create(
        &self,
        criteria: &[(&str, SqlValue)],
        candidate: M,
    ) -> Result<(M, bool), AppError> {
        match self.get_one_or_none(criteria).await? {
            Some(existing) => Ok((existing, false)),
            None => Ok((self.add(candidate).await?, true)),
        }
    }

    async fn exists(&self, criteria: &[(&str, SqlValue)]) -> Result<bool, AppError> {
        Ok(self.get_one_or_none(criteria).await?.is_some())
    }

    /// Number of rows matching the predicate filters; pagination is ignored.
    async fn count(&self, filters: &[Filter]) -> Result<i64, AppError>;

    async fn list(&self, filters: &[Filter]) -> Result<Vec<M>, AppError>;

    async fn list_and_count(&self, filters: &[Filter]) -> Result<(Vec<M>, i64), AppError> {
        let items = self.list(filters).await?;
        let total = self.count(filters).await?;
        Ok((items, total))
    }

    /// Writes every column of an existing row after calling `touch`.
    async fn update(&self, item: M) -> Result<M, AppError>;

    async fn update_many(&self, items: Vec<M>) -> Result<Vec<M>, AppError> {
        let mut updated = Vec::with_capacity(items.len());
        for item in items {
            updated.push(self.update(item).await?);
        }
        Ok(updated)
    }

    /// Insert, or update the row with the same primary key.
    async fn upsert(&self, item: M) -> Result<M, AppError>;

    /// Removes a row by primary key and returns it.
    async fn delete(&self, id: SqlValue) -> Result<M, AppError>;

    /// Removes every listed row that exists and returns them.
    async fn delete_many(&self, ids: Vec<SqlValue>) -> Result<Vec<M>, AppError>;

    async fn health_check(&self) -> Result<(), AppError>;
}
