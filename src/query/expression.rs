//! Resolved query layer: every field reference points into the resource graph.

use crate::graph::{AttrType, Attribute, Relationship, ResourceType, SortDirection};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparisonOperator {
    Equals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Contains,
    StartsWith,
    EndsWith,
}

impl ComparisonOperator {
    /// Operators that only apply to text attributes.
    pub fn is_text_match(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::Contains | ComparisonOperator::StartsWith | ComparisonOperator::EndsWith
        )
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::LessThan
                | ComparisonOperator::LessOrEqual
                | ComparisonOperator::GreaterThan
                | ComparisonOperator::GreaterOrEqual
        )
    }
}

/// Typed filter value, converted from query string text using the attribute type.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(uuid::Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Json(Value),
}

impl Literal {
    pub fn parse(text: &str, attr_type: AttrType) -> Result<Literal, String> {
        let fail = |kind: &str| format!("cannot convert '{}' to {}", text, kind);
        Ok(match attr_type {
            AttrType::String => Literal::String(text.to_string()),
            AttrType::Integer => Literal::Integer(text.trim().parse().map_err(|_| fail("integer"))?),
            AttrType::Float => Literal::Float(text.trim().parse().map_err(|_| fail("number"))?),
            AttrType::Boolean => match text.trim().to_lowercase().as_str() {
                "true" => Literal::Boolean(true),
                "false" => Literal::Boolean(false),
                _ => return Err(fail("boolean")),
            },
            AttrType::Uuid => Literal::Uuid(uuid::Uuid::parse_str(text.trim()).map_err(|_| fail("uuid"))?),
            AttrType::DateTime => Literal::DateTime(
                DateTime::parse_from_rfc3339(text.trim())
                    .map_err(|_| fail("RFC 3339 date-time"))?
                    .with_timezone(&Utc),
            ),
            AttrType::Date => {
                Literal::Date(NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d").map_err(|_| fail("date"))?)
            }
            AttrType::Json => Literal::Json(serde_json::from_str(text).map_err(|_| fail("json"))?),
        })
    }

    /// JSON form, matching how stores materialize the same value.
    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::String(s) => Value::String(s.clone()),
            Literal::Integer(n) => Value::Number((*n).into()),
            Literal::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
            Literal::Boolean(b) => Value::Bool(*b),
            Literal::Uuid(u) => Value::String(u.to_string()),
            Literal::DateTime(d) => Value::String(d.to_rfc3339()),
            Literal::Date(d) => Value::String(d.format("%Y-%m-%d").to_string()),
            Literal::Json(v) => v.clone(),
        }
    }

    /// Literal for a stored key value (join keys, identities).
    pub fn from_json(v: &Value) -> Literal {
        match v {
            Value::Null => Literal::Null,
            Value::Bool(b) => Literal::Boolean(*b),
            Value::Number(n) => n
                .as_i64()
                .map(Literal::Integer)
                .or_else(|| n.as_f64().map(Literal::Float))
                .unwrap_or(Literal::Null),
            Value::String(s) => uuid::Uuid::parse_str(s)
                .map(Literal::Uuid)
                .unwrap_or_else(|_| Literal::String(s.clone())),
            other => Literal::Json(other.clone()),
        }
    }
}

/// One relationship step and the type it lands on.
#[derive(Clone, Debug, PartialEq)]
pub struct Hop {
    pub relationship: Relationship,
    pub target: Arc<ResourceType>,
}

/// Relationship hops followed by a terminal attribute, e.g. `author.name`.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldChain {
    pub hops: Vec<Hop>,
    pub attribute: Attribute,
}

impl FieldChain {
    pub fn attribute(attribute: Attribute) -> Self {
        FieldChain {
            hops: Vec::new(),
            attribute,
        }
    }

    pub fn path(&self) -> String {
        let mut parts: Vec<&str> = self.hops.iter().map(|h| h.relationship.public_name.as_str()).collect();
        parts.push(&self.attribute.public_name);
        parts.join(".")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// Predicate tree. Hops over to-many relationships mean "at least one related row matches".
#[derive(Clone, Debug, PartialEq)]
pub enum FilterExpression {
    Comparison {
        field: FieldChain,
        op: ComparisonOperator,
        value: Literal,
    },
    Any {
        field: FieldChain,
        values: Vec<Literal>,
    },
    /// A related row exists (and matches `filter`, which is relative to the last hop's target).
    Has {
        hops: Vec<Hop>,
        filter: Option<Box<FilterExpression>>,
    },
    Not(Box<FilterExpression>),
    Logical {
        op: LogicalOperator,
        terms: Vec<FilterExpression>,
    },
}

impl FilterExpression {
    /// Conjunction of the given terms, flattening nested ANDs. None when empty.
    pub fn and(terms: impl IntoIterator<Item = FilterExpression>) -> Option<FilterExpression> {
        let mut flat = Vec::new();
        for t in terms {
            match t {
                FilterExpression::Logical {
                    op: LogicalOperator::And,
                    terms,
                } => flat.extend(terms),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(FilterExpression::Logical {
                op: LogicalOperator::And,
                terms: flat,
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub field: FieldChain,
    pub direction: SortDirection,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SortExpression {
    pub keys: Vec<SortKey>,
}

impl SortExpression {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InclusionChain {
    pub hops: Vec<Hop>,
}

impl InclusionChain {
    /// Dotted path of the first `len` hops, e.g. "comments.author".
    pub fn path(&self, len: usize) -> String {
        relationship_path(self.hops.iter().take(len).map(|h| h.relationship.public_name.as_str()))
    }
}

pub(crate) fn relationship_path<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(".")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaginationSpec {
    /// None = unlimited.
    pub size: Option<u32>,
    /// 1-based.
    pub number: u32,
}

impl Default for PaginationSpec {
    fn default() -> Self {
        PaginationSpec { size: None, number: 1 }
    }
}

impl PaginationSpec {
    pub fn skip(&self) -> u64 {
        match self.size {
            Some(size) => u64::from(self.number.saturating_sub(1)) * u64::from(size),
            None => 0,
        }
    }

    pub fn take(&self) -> Option<u32> {
        self.size
    }
}

/// Requested attribute names per resource type.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SparseFieldSets {
    by_type: BTreeMap<String, BTreeSet<String>>,
}

impl SparseFieldSets {
    pub fn insert(&mut self, resource: &str, fields: BTreeSet<String>) {
        self.by_type.insert(resource.to_string(), fields);
    }

    pub fn get(&self, resource: &str) -> Option<&BTreeSet<String>> {
        self.by_type.get(resource)
    }

    /// True when the attribute is selected, or no fieldset was given for the type.
    pub fn allows(&self, resource: &str, attribute: &str) -> bool {
        self.by_type.get(resource).map(|f| f.contains(attribute)).unwrap_or(true)
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

/// Everything needed to execute and serialize one request.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryLayer {
    pub resource: Arc<ResourceType>,
    pub filter: Option<FilterExpression>,
    pub sort: SortExpression,
    pub includes: Vec<InclusionChain>,
    pub pagination: PaginationSpec,
    pub fields: SparseFieldSets,
    pub include_total_count: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_parse_by_type() {
        assert_eq!(Literal::parse("42", AttrType::Integer), Ok(Literal::Integer(42)));
        assert_eq!(Literal::parse("TRUE", AttrType::Boolean), Ok(Literal::Boolean(true)));
        assert_eq!(
            Literal::parse("2024-02-29", AttrType::Date),
            Ok(Literal::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()))
        );
        assert!(Literal::parse("forty", AttrType::Integer).is_err());
        assert!(Literal::parse("yesterday", AttrType::DateTime).is_err());
    }

    #[test]
    fn test_datetime_literal_normalizes_to_utc() {
        let lit = Literal::parse("2024-01-01T02:00:00+02:00", AttrType::DateTime).unwrap();
        assert_eq!(lit.to_json(), Value::String("2024-01-01T00:00:00+00:00".into()));
    }

    #[test]
    fn test_pagination_window() {
        let page = PaginationSpec { size: Some(20), number: 3 };
        assert_eq!(page.skip(), 40);
        assert_eq!(page.take(), Some(20));
        assert_eq!(PaginationSpec::default().skip(), 0);
    }

    #[test]
    fn test_and_flattens() {
        let leaf = |n: i64| FilterExpression::Comparison {
            field: FieldChain::attribute(Attribute::new("n", AttrType::Integer)),
            op: ComparisonOperator::Equals,
            value: Literal::Integer(n),
        };
        assert_eq!(FilterExpression::and(Vec::new()), None);
        assert_eq!(FilterExpression::and(vec![leaf(1)]), Some(leaf(1)));
        let nested = FilterExpression::and(vec![leaf(1), leaf(2)]).unwrap();
        match FilterExpression::and(vec![nested, leaf(3)]) {
            Some(FilterExpression::Logical { op: LogicalOperator::And, terms }) => assert_eq!(terms.len(), 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sparse_fieldsets_default_to_all() {
        let mut fields = SparseFieldSets::default();
        assert!(fields.allows("articles", "body"));
        fields.insert("articles", ["title".to_string()].into_iter().collect());
        assert!(fields.allows("articles", "title"));
        assert!(!fields.allows("articles", "body"));
        assert!(fields.allows("people", "name"));
    }
}
