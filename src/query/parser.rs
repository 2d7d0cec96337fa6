//! Query string parser: raw key/value pairs -> `RawQuerySet`. Purely syntactic.

use crate::case::to_kebab_case;
use crate::config::ApiOptions;
use crate::error::QueryError;
use crate::graph::{ResourceType, SortDirection};
use crate::query::grammar::parse_filter;
use crate::query::raw::*;
use crate::query::ComparisonOperator;
use std::collections::{HashMap, HashSet};

/// Operators available to `filter[field]=prefix:value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOperator {
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
    Contains,
    StartsWith,
    EndsWith,
    /// Comma-separated membership list.
    In,
    IsNull,
    IsNotNull,
}

/// Default prefix vocabulary: `eq:`, `ne:`, `lt:`, `le:`, `gt:`, `ge:`, `like:`, `starts:`, `ends:`, `in:`, `isnull:`, `isnotnull:`.
pub fn default_operator_vocabulary() -> HashMap<String, FilterOperator> {
    [
        ("eq", FilterOperator::Equals),
        ("ne", FilterOperator::NotEquals),
        ("lt", FilterOperator::LessThan),
        ("le", FilterOperator::LessOrEqual),
        ("gt", FilterOperator::GreaterThan),
        ("ge", FilterOperator::GreaterOrEqual),
        ("like", FilterOperator::Contains),
        ("starts", FilterOperator::StartsWith),
        ("ends", FilterOperator::EndsWith),
        ("in", FilterOperator::In),
        ("isnull", FilterOperator::IsNull),
        ("isnotnull", FilterOperator::IsNotNull),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

#[derive(Clone, Debug)]
pub struct QueryStringParser {
    strict: bool,
    operators: HashMap<String, FilterOperator>,
}

impl QueryStringParser {
    pub fn new(options: &ApiOptions) -> Self {
        QueryStringParser {
            strict: options.strict_query_validation,
            operators: default_operator_vocabulary(),
        }
    }

    /// Add or replace an operator prefix (given without the trailing ':').
    pub fn with_operator(mut self, prefix: &str, op: FilterOperator) -> Self {
        self.operators.insert(prefix.to_string(), op);
        self
    }

    /// Replace the whole operator vocabulary.
    pub fn with_vocabulary(mut self, operators: HashMap<String, FilterOperator>) -> Self {
        self.operators = operators;
        self
    }

    pub fn parse(&self, params: &[(String, String)], root: &ResourceType) -> Result<RawQuerySet, QueryError> {
        let mut set = RawQuerySet::default();
        let mut seen: HashSet<&str> = HashSet::new();
        for (key, value) in params {
            let family = key.split('[').next().unwrap_or_default();
            match family {
                "filter" => {
                    let filter = match bracket_arg(key, value, "filter")? {
                        None => Self::parse_filter_expression(key, value)?,
                        Some(path) => self.parse_bracket_filter(key, path, value)?,
                    };
                    set.filters.push(filter);
                }
                "sort" => {
                    once(&mut seen, key, value)?;
                    no_bracket(key, value, "sort")?;
                    set.sort = Some(Self::parse_sort(key, value)?);
                }
                "include" => {
                    once(&mut seen, key, value)?;
                    no_bracket(key, value, "include")?;
                    set.includes = parse_include(key, value)?;
                }
                "page" => {
                    once(&mut seen, key, value)?;
                    match bracket_arg(key, value, "page")? {
                        Some("size") => set.page.size = Some(parse_number(key, value, 0)?),
                        Some("number") => set.page.number = Some(parse_number(key, value, 1)?),
                        Some(_) => return Err(QueryError::malformed(key, value, "expected page[size] or page[number]")),
                        None => return Err(QueryError::malformed(key, value, "expected page[size] or page[number]")),
                    }
                }
                "fields" => {
                    once(&mut seen, key, value)?;
                    let resource = bracket_arg(key, value, "fields")?
                        .ok_or_else(|| QueryError::malformed(key, value, "expected fields[type]"))?;
                    if set.fields.keys().any(|k| to_kebab_case(k) == to_kebab_case(resource)) {
                        return Err(QueryError::malformed(key, value, "fields for this type may only be specified once"));
                    }
                    set.fields.insert(resource.to_string(), parse_field_list(key, value)?);
                }
                _ if self.strict => {
                    return Err(QueryError::malformed(key, value, "unknown query string parameter"));
                }
                _ => {
                    tracing::warn!(parameter = %key, "ignoring unknown query string parameter");
                }
            }
        }
        tracing::debug!(
            resource = %root.public_name,
            filters = set.filters.len(),
            includes = set.includes.len(),
            "parsed query string"
        );
        Ok(set)
    }

    /// `sort=a,-b.c`: comma-separated keys, leading '-' for descending.
    pub fn parse_sort(parameter: &str, value: &str) -> Result<RawSort, QueryError> {
        let mut keys = Vec::new();
        for token in value.split(',') {
            let token = token.trim();
            let (direction, name) = match token.strip_prefix('-') {
                Some(rest) => (SortDirection::Descending, rest),
                None => (SortDirection::Ascending, token),
            };
            if name.is_empty() {
                let message = if token.is_empty() {
                    "empty sort field"
                } else {
                    "sort direction marker without a field"
                };
                return Err(QueryError::malformed(parameter, value, message));
            }
            keys.push(RawSortKey {
                path: parse_path(parameter, value, name)?,
                direction,
            });
        }
        Ok(RawSort {
            parameter: parameter.to_string(),
            keys,
        })
    }

    /// `filter=and(equals(title,'x'),not(has(comments)))`.
    pub fn parse_filter_expression(parameter: &str, value: &str) -> Result<RawFilterParam, QueryError> {
        let filter = parse_filter(value).map_err(|m| QueryError::malformed(parameter, value, m))?;
        Ok(RawFilterParam {
            parameter: parameter.to_string(),
            filter,
        })
    }

    fn parse_bracket_filter(&self, key: &str, path: &str, value: &str) -> Result<RawFilterParam, QueryError> {
        let path = parse_path(key, value, path)?;
        let (op, operand) = self.split_operator(value);
        let compare = |path: Vec<String>, op, value| RawFilter::Compare { path, op, value };
        let filter = match op {
            FilterOperator::Equals => compare(path, ComparisonOperator::Equals, RawLiteral::Text(operand.into())),
            FilterOperator::NotEquals => RawFilter::Not(Box::new(compare(
                path,
                ComparisonOperator::Equals,
                RawLiteral::Text(operand.into()),
            ))),
            FilterOperator::LessThan => compare(path, ComparisonOperator::LessThan, RawLiteral::Text(operand.into())),
            FilterOperator::LessOrEqual => {
                compare(path, ComparisonOperator::LessOrEqual, RawLiteral::Text(operand.into()))
            }
            FilterOperator::GreaterThan => {
                compare(path, ComparisonOperator::GreaterThan, RawLiteral::Text(operand.into()))
            }
            FilterOperator::GreaterOrEqual => {
                compare(path, ComparisonOperator::GreaterOrEqual, RawLiteral::Text(operand.into()))
            }
            FilterOperator::Contains => compare(path, ComparisonOperator::Contains, RawLiteral::Text(operand.into())),
            FilterOperator::StartsWith => {
                compare(path, ComparisonOperator::StartsWith, RawLiteral::Text(operand.into()))
            }
            FilterOperator::EndsWith => compare(path, ComparisonOperator::EndsWith, RawLiteral::Text(operand.into())),
            FilterOperator::In => {
                let values: Vec<String> = operand.split(',').map(|v| v.trim().to_string()).collect();
                if values.iter().any(String::is_empty) {
                    return Err(QueryError::malformed(key, value, "empty value in membership list"));
                }
                RawFilter::Any { path, values }
            }
            FilterOperator::IsNull => compare(path, ComparisonOperator::Equals, RawLiteral::Null),
            FilterOperator::IsNotNull => {
                RawFilter::Not(Box::new(compare(path, ComparisonOperator::Equals, RawLiteral::Null)))
            }
        };
        Ok(RawFilterParam {
            parameter: key.to_string(),
            filter,
        })
    }

    /// "gt:5" -> (GreaterThan, "5"). Unknown prefixes are part of the value ("12:30" stays equals).
    fn split_operator<'v>(&self, value: &'v str) -> (FilterOperator, &'v str) {
        if let Some((prefix, rest)) = value.split_once(':') {
            if let Some(op) = self.operators.get(prefix) {
                return (*op, rest);
            }
        }
        (FilterOperator::Equals, value)
    }
}

/// `key` is `family` or `family[arg]`; returns the bracket argument.
fn bracket_arg<'k>(key: &'k str, value: &str, family: &str) -> Result<Option<&'k str>, QueryError> {
    let rest = &key[family.len()..];
    if rest.is_empty() {
        return Ok(None);
    }
    let inner = rest
        .strip_prefix('[')
        .and_then(|r| r.strip_suffix(']'))
        .filter(|inner| !inner.contains('[') && !inner.contains(']'))
        .ok_or_else(|| QueryError::malformed(key, value, "unbalanced or nested brackets"))?;
    if inner.trim().is_empty() {
        return Err(QueryError::malformed(key, value, "empty brackets"));
    }
    Ok(Some(inner))
}

fn no_bracket(key: &str, value: &str, family: &str) -> Result<(), QueryError> {
    match bracket_arg(key, value, family)? {
        None => Ok(()),
        Some(_) => Err(QueryError::malformed(key, value, format!("{} does not take a bracketed argument", family))),
    }
}

fn once<'k>(seen: &mut HashSet<&'k str>, key: &'k str, value: &str) -> Result<(), QueryError> {
    if seen.insert(key) {
        Ok(())
    } else {
        Err(QueryError::malformed(key, value, "parameter may only be specified once"))
    }
}

fn parse_path(parameter: &str, value: &str, text: &str) -> Result<Vec<String>, QueryError> {
    let segments: Vec<String> = text.split('.').map(|s| s.trim().to_string()).collect();
    if segments.iter().any(String::is_empty) {
        return Err(QueryError::malformed(parameter, value, format!("empty segment in field path '{}'", text)));
    }
    Ok(segments)
}

fn parse_include(parameter: &str, value: &str) -> Result<Vec<Vec<String>>, QueryError> {
    let mut chains: Vec<Vec<String>> = Vec::new();
    for token in value.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(QueryError::malformed(parameter, value, "empty inclusion chain"));
        }
        let chain = parse_path(parameter, value, token)?;
        if !chains.contains(&chain) {
            chains.push(chain);
        }
    }
    Ok(chains)
}

fn parse_field_list(parameter: &str, value: &str) -> Result<Vec<String>, QueryError> {
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    let names: Vec<String> = value.split(',').map(|s| s.trim().to_string()).collect();
    if names.iter().any(String::is_empty) {
        return Err(QueryError::malformed(parameter, value, "empty field name"));
    }
    Ok(names)
}

fn parse_number(parameter: &str, value: &str, min: u32) -> Result<u32, QueryError> {
    let n: u32 = value
        .trim()
        .parse()
        .map_err(|_| QueryError::malformed(parameter, value, "expected a non-negative integer"))?;
    if n < min {
        return Err(QueryError::malformed(parameter, value, format!("must be {} or greater", min)));
    }
    Ok(n)
}
