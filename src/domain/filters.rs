//! Statement filters understood by every repository.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::error::{AppError, ValidationError};
use super::model::{Model, SqlValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field < before` and/or `field > after`.
    BeforeAfter {
        field: String,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    },
    /// Inclusive variant of [`Filter::BeforeAfter`].
    OnBeforeAfter {
        field: String,
        on_or_before: Option<DateTime<Utc>>,
        on_or_after: Option<DateTime<Utc>>,
    },
    Collection {
        field: String,
        values: Vec<SqlValue>,
    },
    NotInCollection {
        field: String,
        values: Vec<SqlValue>,
    },
    LimitOffset {
        limit: i64,
        offset: i64,
    },
    OrderBy {
        field: String,
        order: SortOrder,
    },
    /// Substring match (`LIKE '%value%'`).
    Search {
        field: String,
        value: String,
        ignore_case: bool,
    },
    NotInSearch {
        field: String,
        value: String,
        ignore_case: bool,
    },
}

impl Filter {
    pub fn before_after(
        field: impl Into<String>,
        before: Option<DateTime<Utc>>,
        after: Option<DateTime<Utc>>,
    ) -> Self {
        Filter::BeforeAfter {
            field: field.into(),
            before,
            after,
        }
    }

    pub fn on_before_after(
        field: impl Into<String>,
        on_or_before: Option<DateTime<Utc>>,
        on_or_after: Option<DateTime<Utc>>,
    ) -> Self {
        Filter::OnBeforeAfter {
            field: field.into(),
            on_or_before,
            on_or_after,
        }
    }

    pub fn collection<V: Into<SqlValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::Collection {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_in_collection<V: Into<SqlValue>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::NotInCollection {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn limit_offset(limit: i64, offset: i64) -> Self {
        Filter::LimitOffset { limit, offset }
    }

    pub fn order_by(field: impl Into<String>, order: SortOrder) -> Self {
        Filter::OrderBy {
            field: field.into(),
            order,
        }
    }

    pub fn search(field: impl Into<String>, value: impl Into<String>, ignore_case: bool) -> Self {
        Filter::Search {
            field: field.into(),
            value: value.into(),
            ignore_case,
        }
    }

    pub fn not_in_search(
        field: impl Into<String>,
        value: impl Into<String>,
        ignore_case: bool,
    ) -> Self {
        Filter::NotInSearch {
            field: field.into(),
            value: value.into(),
            ignore_case,
        }
    }

    /// Column the filter reads, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Filter::BeforeAfter { field, .. }
            | Filter::OnBeforeAfter { field, .. }
            | Filter::Collection { field, .. }
            | Filter::NotInCollection { field, .. }
            | Filter::OrderBy { field, .. }
            | Filter::Search { field, .. }
            | Filter::NotInSearch { field, .. } => Some(field),
            Filter::LimitOffset { .. } => None,
        }
    }

    /// True for filters that restrict which rows match (as opposed to
    /// ordering or pagination).
    pub fn is_predicate(&self) -> bool {
        !matches!(self, Filter::LimitOffset { .. } | Filter::OrderBy { .. })
    }

    /// Evaluates a predicate filter against one entity. Ordering and
    /// pagination filters always match.
    pub fn matches<M: Model>(&self, item: &M) -> bool {
        match self {
            Filter::BeforeAfter {
                field,
                before,
                after,
            } => {
                let value = item.value_of(field);
                bound(&value, *before, |o| o == Ordering::Less)
                    && bound(&value, *after, |o| o == Ordering::Greater)
            }
            Filter::OnBeforeAfter {
                field,
                on_or_before,
                on_or_after,
            } => {
                let value = item.value_of(field);
                bound(&value, *on_or_before, |o| o != Ordering::Greater)
                    && bound(&value, *on_or_after, |o| o != Ordering::Less)
            }
            Filter::Collection { field, values } => {
                if values.is_empty() {
                    return true;
                }
                let value = item.value_of(field);
                values.iter().any(|v| value.sql_eq(v))
            }
            Filter::NotInCollection { field, values } => {
                if values.is_empty() {
                    return true;
                }
                let value = item.value_of(field);
                !value.is_null() && !values.iter().any(|v| value.sql_eq(v))
            }
            Filter::Search {
                field,
                value,
                ignore_case,
            } => contains(&item.value_of(field), value, *ignore_case) == Some(true),
            Filter::NotInSearch {
                field,
                value,
                ignore_case,
            } => contains(&item.value_of(field), value, *ignore_case) == Some(false),
            Filter::LimitOffset { .. } | Filter::OrderBy { .. } => true,
        }
    }
}

fn bound(value: &SqlValue, limit: Option<DateTime<Utc>>, accept: impl Fn(Ordering) -> bool) -> bool {
    match limit {
        None => true,
        Some(limit) => value
            .compare(&SqlValue::Timestamp(limit))
            .is_some_and(accept),
    }
}

/// `None` when the column is not text (SQL `NULL` semantics).
fn contains(value: &SqlValue, needle: &str, ignore_case: bool) -> Option<bool> {
    let haystack = value.as_text()?;
    Some(if ignore_case {
        haystack.to_lowercase().contains(&needle.to_lowercase())
    } else {
        haystack.contains(needle)
    })
}

/// Equality used for lookup criteria; a `Null` criterion matches `NULL`
/// columns (`IS NULL`).
pub fn criterion_matches(actual: &SqlValue, expected: &SqlValue) -> bool {
    if expected.is_null() {
        actual.is_null()
    } else {
        actual.sql_eq(expected)
    }
}

/// Rejects field names that are not columns of `M`.
pub fn check_field<M: Model>(field: &str) -> Result<(), AppError> {
    if M::columns().contains(&field) {
        Ok(())
    } else {
        Err(ValidationError::InvalidField {
            field: field.to_string(),
            message: format!("'{}' has no column named '{field}'", M::table_name()),
        }
        .into())
    }
}

pub fn check_filters<M: Model>(filters: &[Filter]) -> Result<(), AppError> {
    filters
        .iter()
        .filter_map(Filter::field)
        .try_for_each(check_field::<M>)
}

pub fn check_criteria<M: Model>(criteria: &[(&str, SqlValue)]) -> Result<(), AppError> {
    criteria.iter().try_for_each(|(field, _)| check_field::<M>(field))
}

/// The pagination window in effect; the last `LimitOffset` wins.
pub fn pagination(filters: &[Filter]) -> Option<(i64, i64)> {
    filters.iter().rev().find_map(|f| match f {
        Filter::LimitOffset { limit, offset } => Some((*limit, *offset)),
        _ => None,
    })
}

/// Applies filters to an in-memory collection with the same semantics the SQL
/// repositories use. Pagination is skipped when `paginate` is false.
pub fn apply<M: Model>(items: impl IntoIterator<Item = M>, filters: &[Filter], paginate: bool) -> Vec<M> {
    let mut selected: Vec<M> = items
        .into_iter()
        .filter(|item| filters.iter().all(|f| f.matches(item)))
        .collect();

    let orderings: Vec<(&str, SortOrder)> = filters
        .iter()
        .filter_map(|f| match f {
            Filter::OrderBy { field, order } => Some((field.as_str(), *order)),
            _ => None,
        })
        .collect();
    if !orderings.is_empty() {
        selected.sort_by(|a, b| {
            for (field, order) in &orderings {
                let ordering = compare_nulls_last(&a.value_of(field), &b.value_of(field));
                let ordering = match order {
                    SortOrder::Asc => ordering,
                    SortOrder::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
    }

    if paginate {
        if let Some((limit, offset)) = pagination(filters) {
            let offset = usize::try_from(offset).unwrap_or(0);
            let limit = usize::try_from(limit).unwrap_or(0);
            return selected.into_iter().skip(offset).take(limit).collect();
        }
    }
    selected
}

/// PostgreSQL sorts NULL after every value in ascending order.
fn compare_nulls_last(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize)]
    struct Ticket {
        id: i64,
        title: String,
        owner: Option<String>,
        opened_at: DateTime<Utc>,
    }

    impl Model for Ticket {
        fn columns() -> &'static [&'static str] {
            &["id", "title", "owner", "opened_at"]
        }

        fn values(&self) -> Vec<(&'static str, SqlValue)> {
            vec![
                ("id", self.id.into()),
                ("title", self.title.clone().into()),
                ("owner", self.owner.clone().into()),
                ("opened_at", self.opened_at.into()),
            ]
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    fn tickets() -> Vec<Ticket> {
        vec![
            Ticket { id: 1, title: "Login broken".into(), owner: Some("ana".into()), opened_at: day(1) },
            Ticket { id: 2, title: "Slow login page".into(), owner: None, opened_at: day(2) },
            Ticket { id: 3, title: "Export CSV".into(), owner: Some("bo".into()), opened_at: day(3) },
            Ticket { id: 4, title: "Dark mode".into(), owner: Some("ana".into()), opened_at: day(4) },
        ]
    }

    fn ids(items: &[Ticket]) -> Vec<i64> {
        items.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_before_after_is_exclusive() {
        let filters = [Filter::before_after("opened_at", Some(day(4)), Some(day(1)))];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![2, 3]);
    }

    #[test]
    fn test_on_before_after_is_inclusive() {
        let filters = [Filter::on_before_after("opened_at", Some(day(3)), Some(day(2)))];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![2, 3]);
    }

    #[test]
    fn test_collection_filters() {
        let filters = [Filter::collection("id", [1_i64, 3])];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![1, 3]);

        let empty: [Filter; 1] = [Filter::collection::<i64>("id", [])];
        assert_eq!(apply(tickets(), &empty, true).len(), 4);

        let filters = [Filter::not_in_collection("owner", ["ana"])];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![3]);
    }

    #[test]
    fn test_search_filters() {
        let filters = [Filter::search("title", "login", false)];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![2]);

        let filters = [Filter::search("title", "login", true)];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![1, 2]);

        let filters = [Filter::not_in_search("title", "LOGIN", true)];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![3, 4]);
    }

    #[test]
    fn test_order_and_pagination() {
        let filters = [
            Filter::order_by("owner", SortOrder::Asc),
            Filter::order_by("id", SortOrder::Desc),
            Filter::limit_offset(2, 1),
        ];
        assert_eq!(ids(&apply(tickets(), &filters, true)), vec![1, 3]);
        assert_eq!(apply(tickets(), &filters, false).len(), 4);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = check_filters::<Ticket>(&[Filter::search("body", "x", false)]).unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationError::InvalidField { ref field, .. }) if field == "body"
        ));
        assert!(check_criteria::<Ticket>(&[("title", "x".into())]).is_ok());
    }
}
