//! Generic PostgreSQL repository.
//!
//! Rows are read back as `to_jsonb(t)` and deserialized with serde, so any
//! model whose serde field names match its column names works without a
//! hand-written row mapper.
//!
//! A repository runs either on the pool, one statement per checkout, or
//! inside a [`Session`](super::Session) transaction.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Row, Transaction};
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use crate::domain::filters::{check_criteria, check_filters, pagination};
use crate::domain::{AppError, DatabaseError, Filter, Model, Repository, SortOrder, SqlValue};

const ROW_ALIAS: &str = "t";

/// Transaction shared between a session and its repositories.
pub(crate) type SharedTransaction = Arc<Mutex<Transaction<'static, Postgres>>>;

#[derive(Clone)]
enum Backend {
    Pool(PgPool),
    Session(SharedTransaction),
}

impl Backend {
    async fn fetch_all(&self, builder: &mut QueryBuilder<'static, Postgres>) -> Result<Vec<PgRow>, AppError> {
        debug!(sql = builder.sql(), "repository query");
        let query = builder.build();
        let rows = match self {
            Backend::Pool(pool) => query.fetch_all(pool).await?,
            Backend::Session(tx) => {
                let mut tx = tx.lock().await;
                query.fetch_all(&mut **tx).await?
            }
        };
        Ok(rows)
    }

    async fn fetch_optional(
        &self,
        builder: &mut QueryBuilder<'static, Postgres>,
    ) -> Result<Option<PgRow>, AppError> {
        debug!(sql = builder.sql(), "repository query");
        let query = builder.build();
        let row = match self {
            Backend::Pool(pool) => query.fetch_optional(pool).await?,
            Backend::Session(tx) => {
                let mut tx = tx.lock().await;
                query.fetch_optional(&mut **tx).await?
            }
        };
        Ok(row)
    }

    async fn fetch_one(&self, builder: &mut QueryBuilder<'static, Postgres>) -> Result<PgRow, AppError> {
        debug!(sql = builder.sql(), "repository query");
        let query = builder.build();
        let row = match self {
            Backend::Pool(pool) => query.fetch_one(pool).await?,
            Backend::Session(tx) => {
                let mut tx = tx.lock().await;
                query.fetch_one(&mut **tx).await?
            }
        };
        Ok(row)
    }
}

pub struct PostgresRepository<M> {
    backend: Backend,
    _model: PhantomData<fn() -> M>,
}

impl<M> Clone for PostgresRepository<M> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> PostgresRepository<M> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            backend: Backend::Pool(pool),
            _model: PhantomData,
        }
    }

    pub(crate) fn in_session(tx: SharedTransaction) -> Self {
        Self {
            backend: Backend::Session(tx),
            _model: PhantomData,
        }
    }

    /// True when writes wait for the owning session to commit.
    pub fn is_transactional(&self) -> bool {
        matches!(self.backend, Backend::Session(_))
    }

    fn table() -> String {
        quote_ident(&M::table_name())
    }

    fn select() -> QueryBuilder<'static, Postgres> {
        QueryBuilder::new(format!(
            "SELECT to_jsonb({ROW_ALIAS}) FROM {} AS {ROW_ALIAS}",
            Self::table()
        ))
    }

    /// `INSERT ... RETURNING`. A `NULL` primary key is left to the column default.
    fn insert(item: &M) -> QueryBuilder<'static, Postgres> {
        let pk = M::primary_key();
        let values: Vec<(&'static str, SqlValue)> = item
            .values()
            .into_iter()
            .filter(|(column, value)| !(*column == pk && value.is_null()))
            .collect();

        let mut builder = QueryBuilder::new(format!("INSERT INTO {} AS {ROW_ALIAS} (", Self::table()));
        push_column_list(&mut builder, &values);
        builder.push(") VALUES (");
        push_value_list(&mut builder, &values);
        builder.push(")");
        builder
    }

    fn returning(builder: &mut QueryBuilder<'static, Postgres>) {
        builder.push(format!(" RETURNING to_jsonb({ROW_ALIAS})"));
    }
}

impl<M: Model + DeserializeOwned> PostgresRepository<M> {
    async fn fetch_all(&self, builder: &mut QueryBuilder<'static, Postgres>) -> Result<Vec<M>, AppError> {
        let rows = self.backend.fetch_all(builder).await?;
        rows.iter().map(decode::<M>).collect()
    }

    async fn fetch_optional(
        &self,
        builder: &mut QueryBuilder<'static, Postgres>,
    ) -> Result<Option<M>, AppError> {
        let row = self.backend.fetch_optional(builder).await?;
        row.as_ref().map(decode::<M>).transpose()
    }

    async fn insert_all(conn: &mut PgConnection, items: &[M]) -> Result<Vec<M>, AppError> {
        let mut added = Vec::with_capacity(items.len());
        for item in items {
            let mut builder = Self::insert(item);
            Self::returning(&mut builder);
            debug!(sql = builder.sql(), "repository query");
            if let Some(row) = builder.build().fetch_optional(&mut *conn).await? {
                added.push(decode::<M>(&row)?);
            }
        }
        Ok(added)
    }

    fn not_found(id: &SqlValue) -> AppError {
        DatabaseError::NotFound(format!("{} with {} = {id:?}", M::table_name(), M::primary_key())).into()
    }
}

#[async_trait]
impl<M: Model + DeserializeOwned> Repository<M> for PostgresRepository<M> {
    #[instrument(skip(self, item), fields(table = %M::table_name()))]
    async fn add(&self, item: M) -> Result<M, AppError> {
        let mut builder = Self::insert(&item);
        Self::returning(&mut builder);
        self.fetch_optional(&mut builder)
            .await?
            .ok_or_else(|| DatabaseError::Query("insert returned no row".to_string()).into())
    }

    #[instrument(skip(self, items), fields(table = %M::table_name(), count = items.len()))]
    async fn add_many(&self, items: Vec<M>) -> Result<Vec<M>, AppError> {
        match &self.backend {
            Backend::Pool(pool) => {
                let mut tx = pool.begin().await?;
                let added = Self::insert_all(&mut tx, &items).await?;
                tx.commit()
                    .await
                    .map_err(|e| DatabaseError::Transaction(e.to_string()))?;
                Ok(added)
            }
            // The session decides when the batch becomes visible.
            Backend::Session(tx) => {
                let mut tx = tx.lock().await;
                Self::insert_all(&mut tx, &items).await
            }
        }
    }

    #[instrument(skip(self), fields(table = %M::table_name()))]
    async fn get(&self, id: SqlValue) -> Result<M, AppError> {
        let mut builder = Self::select();
        builder.push(" WHERE ");
        push_equals(&mut builder, M::primary_key(), &id);
        self.fetch_optional(&mut builder)
            .await?
            .ok_or_else(|| Self::not_found(&id))
    }

    #[instrument(skip(self, criteria), fields(table = %M::table_name()))]
    async fn get_one_or_none(&self, criteria: &[(&str, SqlValue)]) -> Result<Option<M>, AppError> {
        check_criteria::<M>(criteria)?;
        let mut builder = Self::select();
        for (index, (column, value)) in criteria.iter().enumerate() {
            builder.push(if index == 0 { " WHERE " } else { " AND " });
            push_equals(&mut builder, column, value);
        }
        builder.push(" LIMIT 1");
        self.fetch_optional(&mut builder).await
    }

    #[instrument(skip(self, filters), fields(table = %M::table_name()))]
    async fn count(&self, filters: &[Filter]) -> Result<i64, AppError> {
        check_filters::<M>(filters)?;
        let mut builder = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM {} AS {ROW_ALIAS}",
            Self::table()
        ));
        push_predicates(&mut builder, filters);
        let row = self.backend.fetch_one(&mut builder).await?;
        Ok(row.try_get::<i64, _>(0)?)
    }

    #[instrument(skip(self, filters), fields(table = %M::table_name()))]
    async fn list(&self, filters: &[Filter]) -> Result<Vec<M>, AppError> {
        check_filters::<M>(filters)?;
        let mut builder = Self::select();
        push_predicates(&mut builder, filters);
        push_ordering(&mut builder, filters);
        if let Some((limit, offset)) = pagination(filters) {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
            builder.push(" OFFSET ");
            builder.push_bind(offset);
        }
        self.fetch_all(&mut builder).await
    }

    #[instrument(skip(self, item), fields(table = %M::table_name()))]
    async fn update(&self, mut item: M) -> Result<M, AppError> {
        item.touch();
        let pk = M::primary_key();
        let id = item.id_value();
        let values: Vec<(&'static str, SqlValue)> = item
            .values()
            .into_iter()
            .filter(|(column, _)| *column != pk)
            .collect();

        let mut builder = QueryBuilder::new(format!("UPDATE {} AS {ROW_ALIAS} SET ", Self::table()));
        for (index, (column, value)) in values.iter().enumerate() {
            if index > 0 {
                builder.push(", ");
            }
            builder.push(quote_ident(column));
            builder.push(" = ");
            push_value(&mut builder, value);
        }
        builder.push(" WHERE ");
        push_equals(&mut builder, pk, &id);
        Self::returning(&mut builder);
        self.fetch_optional(&mut builder)
            .await?
            .ok_or_else(|| Self::not_found(&id))
    }

    #[instrument(skip(self, item), fields(table = %M::table_name()))]
    async fn upsert(&self, mut item: M) -> Result<M, AppError> {
        if item.id_value().is_null() {
            return self.add(item).await;
        }
        item.touch();
        let pk = M::primary_key();
        let mut builder = Self::insert(&item);
        builder.push(format!(" ON CONFLICT ({}) DO UPDATE SET ", quote_ident(pk)));
        let updates: Vec<String> = item
            .values()
            .iter()
            .map(|(column, _)| *column)
            .filter(|column| *column != pk)
            .map(|column| {
                let column = quote_ident(column);
                format!("{column} = EXCLUDED.{column}")
            })
            .collect();
        builder.push(updates.join(", "));
        Self::returning(&mut builder);
        self.fetch_optional(&mut builder)
            .await?
            .ok_or_else(|| DatabaseError::Query("upsert returned no row".to_string()).into())
    }

    #[instrument(skip(self), fields(table = %M::table_name()))]
    async fn delete(&self, id: SqlValue) -> Result<M, AppError> {
        let mut builder =
            QueryBuilder::new(format!("DELETE FROM {} AS {ROW_ALIAS} WHERE ", Self::table()));
        push_equals(&mut builder, M::primary_key(), &id);
        Self::returning(&mut builder);
        self.fetch_optional(&mut builder)
            .await?
            .ok_or_else(|| Self::not_found(&id))
    }

    #[instrument(skip(self, ids), fields(table = %M::table_name(), count = ids.len()))]
    async fn delete_many(&self, ids: Vec<SqlValue>) -> Result<Vec<M>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder =
            QueryBuilder::new(format!("DELETE FROM {} AS {ROW_ALIAS} WHERE ", Self::table()));
        builder.push(quote_ident(M::primary_key()));
        builder.push(" IN (");
        push_value_list_of(&mut builder, &ids);
        builder.push(")");
        Self::returning(&mut builder);
        self.fetch_all(&mut builder).await
    }

    async fn health_check(&self) -> Result<(), AppError> {
        let mut builder = QueryBuilder::new("SELECT 1");
        self.backend
            .fetch_one(&mut builder)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }
}

fn decode<M: DeserializeOwned>(row: &PgRow) -> Result<M, AppError> {
    let value: serde_json::Value = row.try_get(0)?;
    Ok(serde_json::from_value(value)?)
}

/// Double-quotes an identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes `LIKE` wildcards so the needle matches literally.
pub(crate) fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn push_value(builder: &mut QueryBuilder<'static, Postgres>, value: &SqlValue) {
    match value {
        SqlValue::Null => {
            builder.push("NULL");
        }
        SqlValue::Bool(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Int(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Float(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Text(v) => {
            builder.push_bind(v.clone());
        }
        SqlValue::Uuid(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Timestamp(v) => {
            builder.push_bind(*v);
        }
        SqlValue::Json(v) => {
            builder.push_bind(sqlx::types::Json(v.clone()));
        }
    }
}

fn push_column_list(builder: &mut QueryBuilder<'static, Postgres>, values: &[(&'static str, SqlValue)]) {
    let columns: Vec<String> = values.iter().map(|(column, _)| quote_ident(column)).collect();
    builder.push(columns.join(", "));
}

fn push_value_list(builder: &mut QueryBuilder<'static, Postgres>, values: &[(&'static str, SqlValue)]) {
    for (index, (_, value)) in values.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        push_value(builder, value);
    }
}

fn push_value_list_of(builder: &mut QueryBuilder<'static, Postgres>, values: &[SqlValue]) {
    for (index, value) in values.iter().enumerate() {
        if index > 0 {
            builder.push(", ");
        }
        push_value(builder, value);
    }
}

fn push_equals(builder: &mut QueryBuilder<'static, Postgres>, column: &str, value: &SqlValue) {
    builder.push(quote_ident(column));
    if value.is_null() {
        builder.push(" IS NULL");
    } else {
        builder.push(" = ");
        push_value(builder, value);
    }
}

fn push_predicates(builder: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) {
    let mut first = true;
    let mut clause = |builder: &mut QueryBuilder<'static, Postgres>| {
        builder.push(if first { " WHERE " } else { " AND " });
        first = false;
    };

    for filter in filters {
        match filter {
            Filter::BeforeAfter {
                field,
                before,
                after,
            } => {
                if let Some(before) = before {
                    clause(builder);
                    builder.push(format!("{} < ", quote_ident(field)));
                    builder.push_bind(*before);
                }
                if let Some(after) = after {
                    clause(builder);
                    builder.push(format!("{} > ", quote_ident(field)));
                    builder.push_bind(*after);
                }
            }
            Filter::OnBeforeAfter {
                field,
                on_or_before,
                on_or_after,
            } => {
                if let Some(on_or_before) = on_or_before {
                    clause(builder);
                    builder.push(format!("{} <= ", quote_ident(field)));
                    builder.push_bind(*on_or_before);
                }
                if let Some(on_or_after) = on_or_after {
                    clause(builder);
                    builder.push(format!("{} >= ", quote_ident(field)));
                    builder.push_bind(*on_or_after);
                }
            }
            Filter::Collection { field, values } | Filter::NotInCollection { field, values } => {
                if values.is_empty() {
                    continue;
                }
                let negate = matches!(filter, Filter::NotInCollection { .. });
                clause(builder);
                builder.push(quote_ident(field));
                builder.push(if negate { " NOT IN (" } else { " IN (" });
                push_value_list_of(builder, values);
                builder.push(")");
            }
            Filter::Search {
                field,
                value,
                ignore_case,
            }
            | Filter::NotInSearch {
                field,
                value,
                ignore_case,
            } => {
                let negate = matches!(filter, Filter::NotInSearch { .. });
                let operator = match (negate, *ignore_case) {
                    (false, false) => " LIKE ",
                    (false, true) => " ILIKE ",
                    (true, false) => " NOT LIKE ",
                    (true, true) => " NOT ILIKE ",
                };
                clause(builder);
                builder.push(quote_ident(field));
                builder.push(operator);
                builder.push_bind(like_pattern(value));
            }
            Filter::LimitOffset { .. } | Filter::OrderBy { .. } => {}
        }
    }
}

fn push_ordering(builder: &mut QueryBuilder<'static, Postgres>, filters: &[Filter]) {
    let terms: Vec<String> = filters
        .iter()
        .filter_map(|filter| match filter {
            Filter::OrderBy { field, order } => Some(format!(
                "{} {}",
                quote_ident(field),
                match order {
                    SortOrder::Asc => "ASC",
                    SortOrder::Desc => "DESC",
                }
            )),
            _ => None,
        })
        .collect();
    if !terms.is_empty() {
        builder.push(" ORDER BY ");
        builder.push(terms.join(", "));
    }
}
