//! Mock implementations for testing.
//!
//! These mocks provide in-memory implementations of domain traits
//! that can be configured to simulate various scenarios including
//! success, failure, and edge cases.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::domain::filters::{apply, check_criteria, check_filters, criterion_matches};
use crate::domain::{
    AppError, DatabaseClient, DatabaseError, ExternalServiceError, Filter, Model, Notifier,
    Repository, SqlValue, ValidationError,
};

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// If true, operations will fail.
    pub should_fail: bool,
    /// Custom error message for failures.
    pub error_message: Option<String>,
    /// Simulated latency in milliseconds.
    pub latency_ms: Option<u64>,
}

impl MockConfig {
    /// Creates a config that always succeeds.
    #[must_use]
    pub fn success() -> Self {
        Self::default()
    }

    /// Creates a config that always fails.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            should_fail: true,
            error_message: Some(message.into()),
            latency_ms: None,
        }
    }

    /// Adds simulated latency.
    #[must_use]
    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }

    async fn simulate_latency(&self) {
        if let Some(ms) = self.latency_ms {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn message_or(&self, default: &str) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Mock database client for testing.
///
/// # Example
///
/// ```
/// use clean_architecture_boilerplate::test_utils::{MockDatabaseClient, mocks::MockConfig};
///
/// // Create a mock that succeeds
/// let mock = MockDatabaseClient::new();
///
/// // Create a mock that fails
/// let failing_mock = MockDatabaseClient::with_config(MockConfig::failure("DB error"));
/// ```
pub struct MockDatabaseClient {
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockDatabaseClient {
    /// Creates a new mock with default (success) configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    /// Creates a new mock with the given configuration.
    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    /// Creates a mock that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    /// Gets the number of times any method was called.
    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Sets the health status.
    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }
}

impl Default for MockDatabaseClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate_latency().await;

        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::Database(DatabaseError::Connection(
                "Mock database unhealthy".to_string(),
            )));
        }
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message_or("Mock database error"),
            )));
        }
        Ok(())
    }
}

/// Mock notifier that records delivered messages.
pub struct MockNotifier {
    sent: Mutex<Vec<String>>,
    config: MockConfig,
    call_count: AtomicU64,
    is_healthy: AtomicBool,
}

impl MockNotifier {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            config,
            call_count: AtomicU64::new(0),
            is_healthy: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self::with_config(MockConfig::failure(message))
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.is_healthy.store(healthy, Ordering::Relaxed);
    }

    /// Messages delivered so far, oldest first.
    pub fn sent_messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, text: &str) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.config.simulate_latency().await;

        if self.config.should_fail {
            return Err(AppError::ExternalService(ExternalServiceError::HttpError(
                self.config.message_or("Mock notifier error"),
            )));
        }
        self.sent.lock().unwrap().push(text.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        if !self.is_healthy.load(Ordering::Relaxed) {
            return Err(AppError::ExternalService(ExternalServiceError::Unavailable(
                "Mock notifier unhealthy".to_string(),
            )));
        }
        Ok(())
    }
}

/// Repository backed by a vector, evaluating filters in memory with the
/// same semantics as the SQL repository.
pub struct InMemoryRepository<M> {
    rows: Arc<Mutex<Vec<M>>>,
    config: MockConfig,
}

impl<M: Model> InMemoryRepository<M> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(MockConfig::success())
    }

    #[must_use]
    pub fn with_config(config: MockConfig) -> Self {
        Self {
            rows: Arc::new(Mutex::new(Vec::new())),
            config,
        }
    }

    /// Snapshot of the stored rows in insertion order.
    pub fn rows(&self) -> Vec<M> {
        self.rows.lock().unwrap().clone()
    }

    fn check_should_fail(&self) -> Result<(), AppError> {
        if self.config.should_fail {
            return Err(AppError::Database(DatabaseError::Query(
                self.config.message_or("Mock repository error"),
            )));
        }
        Ok(())
    }

    fn require_id(item: &M) -> Result<SqlValue, AppError> {
        let id = item.id_value();
        if id.is_null() {
            return Err(ValidationError::MissingField(M::primary_key().to_string()).into());
        }
        Ok(id)
    }

    fn position(rows: &[M], id: &SqlValue) -> Option<usize> {
        rows.iter().position(|row| criterion_matches(&row.id_value(), id))
    }

    fn not_found(id: &SqlValue) -> AppError {
        DatabaseError::NotFound(format!("{} with {} = {id:?}", M::table_name(), M::primary_key()))
            .into()
    }
}

impl<M: Model> Default for InMemoryRepository<M> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<M: Model> Repository<M> for InMemoryRepository<M> {
    async fn add(&self, item: M) -> Result<M, AppError> {
        self.check_should_fail()?;
        let id = Self::require_id(&item)?;
        let mut rows = self.rows.lock().unwrap();
        if Self::position(&rows, &id).is_some() {
            return Err(DatabaseError::Duplicate(format!("{id:?}")).into());
        }
        rows.push(item.clone());
        Ok(item)
    }

    async fn add_many(&self, items: Vec<M>) -> Result<Vec<M>, AppError> {
        self.check_should_fail()?;
        let mut rows = self.rows.lock().unwrap();
        let mut ids = Vec::with_capacity(items.len());
        for item in &items {
            let id = Self::require_id(item)?;
            if Self::position(&rows, &id).is_some() || ids.iter().any(|seen| criterion_matches(seen, &id)) {
                return Err(DatabaseError::Duplicate(format!("{id:?}")).into());
            }
            ids.push(id);
        }
        rows.extend(items.iter().cloned());
        Ok(items)
    }

    async fn get(&self, id: SqlValue) -> Result<M, AppError> {
        self.check_should_fail()?;
        let rows = self.rows.lock().unwrap();
        Self::position(&rows, &id)
            .map(|index| rows[index].clone())
            .ok_or_else(|| Self::not_found(&id))
    }

    async fn get_one_or_none(&self, criteria: &[(&str, SqlValue)]) -> Result<Option<M>, AppError> {
        self.check_should_fail()?;
        check_criteria::<M>(criteria)?;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .find(|row| {
                criteria
                    .iter()
                    .all(|(column, value)| criterion_matches(&row.value_of(column), value))
            })
            .cloned())
    }

    async fn count(&self, filters: &[Filter]) -> Result<i64, AppError> {
        self.check_should_fail()?;
        check_filters::<M>(filters)?;
        let rows = self.rows();
        Ok(apply(rows, filters, false).len() as i64)
    }

    async fn list(&self, filters: &[Filter]) -> Result<Vec<M>, AppError> {
        self.check_should_fail()?;
        check_filters::<M>(filters)?;
        Ok(apply(self.rows(), filters, true))
    }

    async fn update(&self, mut item: M) -> Result<M, AppError> {
        self.check_should_fail()?;
        item.touch();
        let id = item.id_value();
        let mut rows = self.rows.lock().unwrap();
        let index = Self::position(&rows, &id).ok_or_else(|| Self::not_found(&id))?;
        rows[index] = item.clone();
        Ok(item)
    }

    async fn upsert(&self, mut item: M) -> Result<M, AppError> {
        self.check_should_fail()?;
        item.touch();
        let id = Self::require_id(&item)?;
        let mut rows = self.rows.lock().unwrap();
        match Self::position(&rows, &id) {
            Some(index) => rows[index] = item.clone(),
            None => rows.push(item.clone()),
        }
        Ok(item)
    }

    async fn delete(&self, id: SqlValue) -> Result<M, AppError> {
        self.check_should_fail()?;
        let mut rows = self.rows.lock().unwrap();
        let index = Self::position(&rows, &id).ok_or_else(|| Self::not_found(&id))?;
        Ok(rows.remove(index))
    }

    async fn delete_many(&self, ids: Vec<SqlValue>) -> Result<Vec<M>, AppError> {
        self.check_should_fail()?;
        let mut rows = self.rows.lock().unwrap();
        let mut removed = Vec::new();
        for id in &ids {
            if let Some(index) = Self::position(&rows, id) {
                removed.push(rows.remove(index));
            }
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<(), AppError> {
        self.check_should_fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AuditColumns, SortOrder};
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize, PartialEq)]
    struct Project {
        id: i64,
        name: String,
        #[serde(flatten)]
        audit: AuditColumns,
    }

    impl Project {
        fn new(id: i64, name: &str) -> Self {
            Self {
                id,
                name: name.to_string(),
                audit: AuditColumns::now(),
            }
        }
    }

    impl Model for Project {
        fn columns() -> &'static [&'static str] {
            &["id", "name", "created_at", "updated_at"]
        }

        fn values(&self) -> Vec<(&'static str, SqlValue)> {
            vec![
                ("id", self.id.into()),
                ("name", self.name.clone().into()),
                ("created_at", self.audit.created_at.into()),
                ("updated_at", self.audit.updated_at.into()),
            ]
        }

        fn touch(&mut self) {
            self.audit.touch();
        }
    }

    #[tokio::test]
    async fn test_mock_database_health() {
        let mock = MockDatabaseClient::new();
        assert!(mock.health_check().await.is_ok());

        mock.set_healthy(false);
        assert!(mock.health_check().await.is_err());
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_database_failure() {
        let mock = MockDatabaseClient::failing("Connection refused");
        let err = mock.health_check().await.unwrap_err();
        assert!(err.to_string().contains("Connection refused"));
    }

    #[tokio::test]
    async fn test_mock_notifier_records_messages() {
        let notifier = MockNotifier::new();
        notifier.send("one").await.unwrap();
        notifier.send("two").await.unwrap();
        assert_eq!(notifier.sent_messages(), vec!["one", "two"]);
        assert_eq!(notifier.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_notifier_failure() {
        let notifier = MockNotifier::failing("chat not found");
        assert!(notifier.send("one").await.is_err());
        assert!(notifier.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_in_memory_repository_crud() {
        let repo = InMemoryRepository::<Project>::new();
        repo.add(Project::new(1, "alpha")).await.unwrap();
        repo.add_many(vec![Project::new(2, "beta"), Project::new(3, "gamma")])
            .await
            .unwrap();

        let duplicate = repo.add(Project::new(1, "again")).await.unwrap_err();
        assert!(matches!(duplicate, AppError::Database(DatabaseError::Duplicate(_))));

        let mut beta = repo.get(2_i64.into()).await.unwrap();
        beta.name = "beta-2".to_string();
        let updated = repo.update(beta).await.unwrap();
        assert!(updated.audit.updated_at >= updated.audit.created_at);
        assert_eq!(repo.get_one(&[("name", "beta-2".into())]).await.unwrap().id, 2);

        let (created, was_created) = repo
            .get_or_create(&[("name", "delta".into())], Project::new(4, "delta"))
            .await
            .unwrap();
        assert!(was_created);
        assert_eq!(created.id, 4);
        let (_, was_created) = repo
            .get_or_create(&[("name", "delta".into())], Project::new(5, "delta"))
            .await
            .unwrap();
        assert!(!was_created);

        assert!(repo.exists(&[("id", 3_i64.into())]).await.unwrap());
        assert_eq!(repo.delete(3_i64.into()).await.unwrap().name, "gamma");
        assert!(!repo.exists(&[("id", 3_i64.into())]).await.unwrap());

        let removed = repo
            .delete_many(vec![1_i64.into(), 99_i64.into()])
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(repo.rows().len(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_repository_list_and_count() {
        let repo = InMemoryRepository::<Project>::new();
        for (id, name) in [(1, "api"), (2, "api-gateway"), (3, "worker"), (4, "web")] {
            repo.add(Project::new(id, name)).await.unwrap();
        }

        let filters = [
            Filter::search("name", "w", false),
            Filter::order_by("name", SortOrder::Desc),
            Filter::limit_offset(1, 0),
        ];
        let (items, total) = repo.list_and_count(&filters).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "worker");
    }

    #[tokio::test]
    async fn test_in_memory_repository_errors() {
        let repo = InMemoryRepository::<Project>::new();
        let err = repo.get(7_i64.into()).await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::NotFound(_))));

        let err = repo.update(Project::new(7, "ghost")).await.unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::NotFound(_))));

        let err = repo.list(&[Filter::search("owner", "x", false)]).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationError::InvalidField { .. })));

        let failing = InMemoryRepository::<Project>::with_config(MockConfig::failure("down"));
        assert!(failing.health_check().await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_upsert() {
        let repo = InMemoryRepository::<Project>::new();
        repo.upsert(Project::new(1, "first")).await.unwrap();
        repo.upsert(Project::new(1, "renamed")).await.unwrap();
        let rows = repo.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name, "renamed");
    }
}
