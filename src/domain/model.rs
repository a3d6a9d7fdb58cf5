//! Persistence conventions shared by all models.
//!
//! Models describe their table, columns and current column values; the
//! repositories use that description to build statements and to evaluate
//! filters, so no model needs hand-written SQL for basic CRUD.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::AppError;

/// A column value as seen by the repositories.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Orders two values of compatible kinds. `Null` and mismatched kinds are
    /// unordered, mirroring SQL comparison semantics.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (SqlValue::Bool(a), SqlValue::Bool(b)) => Some(a.cmp(b)),
            (SqlValue::Int(a), SqlValue::Int(b)) => Some(a.cmp(b)),
            (SqlValue::Float(a), SqlValue::Float(b)) => a.partial_cmp(b),
            (SqlValue::Int(a), SqlValue::Float(b)) => (*a as f64).partial_cmp(b),
            (SqlValue::Float(a), SqlValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (SqlValue::Text(a), SqlValue::Text(b)) => Some(a.cmp(b)),
            (SqlValue::Uuid(a), SqlValue::Uuid(b)) => Some(a.cmp(b)),
            (SqlValue::Timestamp(a), SqlValue::Timestamp(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// SQL-style equality: `NULL` equals nothing.
    pub fn sql_eq(&self, other: &SqlValue) -> bool {
        match (self, other) {
            (SqlValue::Null, _) | (_, SqlValue::Null) => false,
            (SqlValue::Json(a), SqlValue::Json(b)) => a == b,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Uuid> for SqlValue {
    fn from(v: Uuid) -> Self {
        SqlValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl From<serde_json::Value> for SqlValue {
    fn from(v: serde_json::Value) -> Self {
        SqlValue::Json(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// A persisted entity.
///
/// `columns()` lists every column the repository may read, write or filter
/// on; field names outside that list are rejected before any SQL is built.
pub trait Model: Clone + Serialize + Send + Sync + Unpin + 'static {
    fn table_name() -> String {
        let full = std::any::type_name::<Self>();
        let base = full.split('<').next().unwrap_or(full);
        infer_table_name(base.rsplit("::").next().unwrap_or(base))
    }

    fn columns() -> &'static [&'static str];

    fn primary_key() -> &'static str {
        "id"
    }

    /// Current column values, in `columns()` order.
    fn values(&self) -> Vec<(&'static str, SqlValue)>;

    /// Called before the entity is written by an update.
    fn touch(&mut self) {}

    fn value_of(&self, column: &str) -> SqlValue {
        self.values()
            .into_iter()
            .find(|(name, _)| *name == column)
            .map_or(SqlValue::Null, |(_, value)| value)
    }

    fn id_value(&self) -> SqlValue {
        self.value_of(Self::primary_key())
    }

    /// Dictionary view of the entity without the excluded keys.
    fn to_map(&self, exclude: &[&str]) -> Result<serde_json::Map<String, serde_json::Value>, AppError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(mut map) => {
                for key in exclude {
                    map.remove(*key);
                }
                Ok(map)
            }
            other => Err(AppError::Serialization(format!(
                "model serialized to {other}, expected an object"
            ))),
        }
    }
}

/// Infers a table name from a type name: `UserAccount` → `user_account`,
/// `HTTPRequest` → `http_request`.
pub fn infer_table_name(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut out = String::with_capacity(type_name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let after_lower_or_digit = prev.is_ascii_lowercase() || prev.is_ascii_digit();
            let starts_word = next.is_some_and(|n| n.is_ascii_lowercase());
            if after_lower_or_digit || starts_word {
                out.push('_');
            }
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

/// Creation and modification timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditColumns {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditColumns {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

impl Default for AuditColumns {
    fn default() -> Self {
        Self::now()
    }
}

/// New random primary key for UUID-keyed models.
pub fn uuid_primary_key() -> Uuid {
    Uuid::new_v4()
}

/// Sequence backing a BIGINT primary key.
pub fn bigint_sequence_name(table: &str) -> String {
    format!("{table}_id_seq")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Index,
    Unique,
    Check,
    ForeignKey,
    PrimaryKey,
}

/// Deterministic constraint names.
///
/// `column` is the first column for indexes, unique and foreign keys, and the
/// constraint's own name for checks. `referred` is the referenced table of a
/// foreign key.
pub fn constraint_name(
    kind: ConstraintKind,
    table: &str,
    column: &str,
    referred: Option<&str>,
) -> String {
    match kind {
        ConstraintKind::Index => format!("ix_{table}_{column}"),
        ConstraintKind::Unique => format!("uq_{table}_{column}"),
        ConstraintKind::Check => format!("ck_{table}_{column}"),
        ConstraintKind::ForeignKey => {
            format!("fk_{table}_{column}_{}", referred.unwrap_or_default())
        }
        ConstraintKind::PrimaryKey => format!("pk_{table}"),
    }
}
