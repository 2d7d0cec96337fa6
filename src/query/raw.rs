//! Syntactic query primitives produced by the parser. Names are not yet checked against the graph.

use crate::graph::SortDirection;
use crate::query::ComparisonOperator;
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq)]
pub enum RawLiteral {
    Null,
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RawFilter {
    Compare {
        path: Vec<String>,
        op: ComparisonOperator,
        value: RawLiteral,
    },
    Any {
        path: Vec<String>,
        values: Vec<String>,
    },
    Has {
        path: Vec<String>,
        filter: Option<Box<RawFilter>>,
    },
    Not(Box<RawFilter>),
    And(Vec<RawFilter>),
    Or(Vec<RawFilter>),
}

/// A filter together with the query parameter it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct RawFilterParam {
    pub parameter: String,
    pub filter: RawFilter,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawSortKey {
    pub path: Vec<String>,
    pub direction: SortDirection,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RawSort {
    pub parameter: String,
    pub keys: Vec<RawSortKey>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawPage {
    pub size: Option<u32>,
    pub number: Option<u32>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawQuerySet {
    pub filters: Vec<RawFilterParam>,
    pub sort: Option<RawSort>,
    /// Each chain is a list of relationship names, in request order, without duplicates.
    pub includes: Vec<Vec<String>>,
    pub page: RawPage,
    /// Resource type name (as written by the client) -> attribute names.
    pub fields: BTreeMap<String, Vec<String>>,
}
