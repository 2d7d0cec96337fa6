//! In-process data source over `Vec<Record>` tables. Used by tests and demos.

use super::{key_string, DataSource, Record, StoreQuery};
use crate::error::DataAccessError;
use crate::graph::{ResourceType, SortDirection};
use crate::query::{ComparisonOperator, FieldChain, FilterExpression, Hop, Literal, LogicalOperator, SortKey};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::RwLock;

type Tables = HashMap<String, Vec<Record>>;

/// Tables are keyed by `ResourceType::table`.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    tables: RwLock<Tables>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<Record>)>,
        S: Into<String>,
    {
        InMemoryDataSource {
            tables: RwLock::new(tables.into_iter().map(|(name, rows)| (name.into(), rows)).collect()),
        }
    }

    pub fn insert(&self, table: &str, record: Record) -> Result<(), DataAccessError> {
        let mut tables = self.tables.write().map_err(|_| poisoned())?;
        tables.entry(table.to_string()).or_default().push(record);
        Ok(())
    }
}

fn poisoned() -> DataAccessError {
    DataAccessError::Unavailable("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl DataSource for InMemoryDataSource {
    async fn fetch(&self, query: &StoreQuery) -> Result<Vec<Record>, DataAccessError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let rows = tables.get(&query.resource.table).map(Vec::as_slice).unwrap_or_default();
        let mut matched: Vec<&Record> = rows
            .iter()
            .filter(|row| query.filter.as_ref().map_or(true, |f| matches(&tables, row, f)))
            .collect();
        matched.sort_by(|a, b| compare_rows(&tables, a, b, &query.sort));
        let skip = usize::try_from(query.window.skip).unwrap_or(usize::MAX);
        let take = query.window.take.map_or(usize::MAX, |n| n as usize);
        Ok(matched
            .into_iter()
            .skip(skip)
            .take(take)
            .map(|row| project(row, &query.columns))
            .collect())
    }

    async fn count(&self, resource: &ResourceType, filter: Option<&FilterExpression>) -> Result<u64, DataAccessError> {
        let tables = self.tables.read().map_err(|_| poisoned())?;
        let rows = tables.get(&resource.table).map(Vec::as_slice).unwrap_or_default();
        Ok(rows
            .iter()
            .filter(|row| filter.map_or(true, |f| matches(&tables, row, f)))
            .count() as u64)
    }
}

fn project(row: &Record, columns: &[String]) -> Record {
    columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect()
}

/// Rows reached from `record` by following `hops`.
fn reach<'t>(tables: &'t Tables, record: &'t Record, hops: &[Hop]) -> Vec<&'t Record> {
    let mut current = vec![record];
    for hop in hops {
        let rows = tables.get(&hop.target.table).map(Vec::as_slice).unwrap_or_default();
        let relationship = &hop.relationship;
        current = current
            .into_iter()
            .filter_map(|owner| owner.get(&relationship.our_key).and_then(key_string))
            .flat_map(|key| {
                rows.iter()
                    .filter(move |row| row.get(&relationship.their_key).and_then(key_string).as_ref() == Some(&key))
            })
            .collect();
    }
    current
}

fn field_values<'t>(tables: &'t Tables, record: &'t Record, field: &FieldChain) -> Vec<&'t Value> {
    reach(tables, record, &field.hops)
        .into_iter()
        .map(|row| row.get(&field.attribute.column).unwrap_or(&Value::Null))
        .collect()
}

fn matches(tables: &Tables, record: &Record, filter: &FilterExpression) -> bool {
    match filter {
        FilterExpression::Comparison { field, op, value } => field_values(tables, record, field)
            .into_iter()
            .any(|v| compare_literal(v, *op, value)),
        FilterExpression::Any { field, values } => field_values(tables, record, field)
            .into_iter()
            .any(|v| values.iter().any(|lit| compare(v, lit) == Some(Ordering::Equal))),
        FilterExpression::Has { hops, filter } => reach(tables, record, hops)
            .into_iter()
            .any(|row| filter.as_ref().map_or(true, |f| matches(tables, row, f))),
        FilterExpression::Not(inner) => !matches(tables, record, inner),
        FilterExpression::Logical {
            op: LogicalOperator::And,
            terms,
        } => terms.iter().all(|t| matches(tables, record, t)),
        FilterExpression::Logical {
            op: LogicalOperator::Or,
            terms,
        } => terms.iter().any(|t| matches(tables, record, t)),
    }
}

fn compare_literal(value: &Value, op: ComparisonOperator, literal: &Literal) -> bool {
    if let Literal::Null = literal {
        return op == ComparisonOperator::Equals && value.is_null();
    }
    let text = |f: fn(&str, &str) -> bool| match (value, literal) {
        (Value::String(s), Literal::String(pattern)) => f(s, pattern),
        _ => false,
    };
    match op {
        ComparisonOperator::Equals => compare(value, literal) == Some(Ordering::Equal),
        ComparisonOperator::LessThan => compare(value, literal) == Some(Ordering::Less),
        ComparisonOperator::LessOrEqual => matches!(compare(value, literal), Some(Ordering::Less | Ordering::Equal)),
        ComparisonOperator::GreaterThan => compare(value, literal) == Some(Ordering::Greater),
        ComparisonOperator::GreaterOrEqual => {
            matches!(compare(value, literal), Some(Ordering::Greater | Ordering::Equal))
        }
        ComparisonOperator::Contains => text(|s, p| s.contains(p)),
        ComparisonOperator::StartsWith => text(|s, p| s.starts_with(p)),
        ComparisonOperator::EndsWith => text(|s, p| s.ends_with(p)),
    }
}

/// Stored value against a typed literal; None when either side is null or the types disagree.
fn compare(value: &Value, literal: &Literal) -> Option<Ordering> {
    match (value, literal) {
        (Value::Null, _) | (_, Literal::Null) => None,
        (Value::Number(n), Literal::Integer(i)) => match n.as_i64() {
            Some(v) => Some(v.cmp(i)),
            None => n.as_f64()?.partial_cmp(&(*i as f64)),
        },
        (Value::Number(n), Literal::Float(f)) => n.as_f64()?.partial_cmp(f),
        (Value::Bool(b), Literal::Boolean(x)) => Some(b.cmp(x)),
        (Value::String(s), Literal::String(x)) => Some(s.as_str().cmp(x.as_str())),
        (Value::String(s), Literal::Integer(i)) => Some(s.parse::<i64>().ok()?.cmp(i)),
        (Value::String(s), Literal::Uuid(u)) => Some(uuid::Uuid::parse_str(s).ok()?.cmp(u)),
        (Value::String(s), Literal::DateTime(d)) => {
            Some(DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc).cmp(d))
        }
        (Value::String(s), Literal::Date(d)) => Some(NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.cmp(d)),
        (v, Literal::Json(j)) => (v == j).then_some(Ordering::Equal),
        _ => None,
    }
}

/// Nulls sort last ascending and first descending.
fn compare_rows(tables: &Tables, a: &Record, b: &Record, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let first = |r: &Record| field_values(tables, r, &key.field).into_iter().next().cloned().unwrap_or(Value::Null);
        let ordering = compare_json(&first(a), &first(b));
        let ordering = match key.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_json(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => x.as_f64().partial_cmp(&y.as_f64()).unwrap_or(Ordering::Equal),
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
