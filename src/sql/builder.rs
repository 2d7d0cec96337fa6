//! Builds parameterized SELECT and COUNT statements from store queries.

use crate::graph::{AttrType, ResourceType, SortDirection};
use crate::query::{ComparisonOperator, FieldChain, FilterExpression, Hop, Literal, LogicalOperator};
use crate::repository::StoreQuery;

/// Quote identifier for PostgreSQL (safe: only from the resource graph).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Escape LIKE wildcards; used with `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Literal>,
}

impl QueryBuf {
    fn push_param(&mut self, v: Literal) -> String {
        self.params.push(v);
        format!("${}", self.params.len())
    }
}

/// Accumulates params and hands out table aliases (t0 is the root table).
struct SqlWriter {
    buf: QueryBuf,
    next_alias: usize,
}

impl SqlWriter {
    fn new() -> Self {
        SqlWriter {
            buf: QueryBuf::default(),
            next_alias: 1,
        }
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn filter(&mut self, alias: &str, filter: &FilterExpression) -> String {
        match filter {
            FilterExpression::Comparison { field, op, value } => {
                let (op, value) = (*op, value.clone());
                self.through_hops(alias, &field.hops, &mut |w, inner| {
                    w.comparison(&column_ref(inner, &field.attribute.column), op, value.clone())
                })
            }
            FilterExpression::Any { field, values } => self.through_hops(alias, &field.hops, &mut |w, inner| {
                if values.is_empty() {
                    return "FALSE".to_string();
                }
                let placeholders: Vec<String> = values.iter().map(|v| w.buf.push_param(v.clone())).collect();
                format!("{} IN ({})", column_ref(inner, &field.attribute.column), placeholders.join(", "))
            }),
            FilterExpression::Has { hops, filter } => self.through_hops(alias, hops, &mut |w, inner| match filter {
                Some(f) => w.filter(inner, f),
                None => "TRUE".to_string(),
            }),
            FilterExpression::Not(inner) => format!("NOT ({})", self.filter(alias, inner)),
            FilterExpression::Logical { op, terms } => {
                let joiner = match op {
                    LogicalOperator::And => " AND ",
                    LogicalOperator::Or => " OR ",
                };
                let parts: Vec<String> = terms.iter().map(|t| self.filter(alias, t)).collect();
                format!("({})", parts.join(joiner))
            }
        }
    }

    /// Correlated EXISTS per hop; `inner` renders the predicate on the last hop's alias.
    fn through_hops(
        &mut self,
        outer: &str,
        hops: &[Hop],
        inner: &mut dyn FnMut(&mut SqlWriter, &str) -> String,
    ) -> String {
        let Some((hop, rest)) = hops.split_first() else {
            return inner(self, outer);
        };
        let alias = self.alias();
        let body = self.through_hops(&alias, rest, inner);
        format!(
            "EXISTS (SELECT 1 FROM {} {} WHERE {} = {} AND {})",
            qualified_table(&hop.target.schema, &hop.target.table),
            alias,
            column_ref(&alias, &hop.relationship.their_key),
            column_ref(outer, &hop.relationship.our_key),
            body
        )
    }

    fn comparison(&mut self, column: &str, op: ComparisonOperator, value: Literal) -> String {
        if let Literal::Null = value {
            return format!("{} IS NULL", column);
        }
        let like = |w: &mut SqlWriter, pattern: String| {
            let ph = w.buf.push_param(Literal::String(pattern));
            format!("{} LIKE {} ESCAPE '\\'", column, ph)
        };
        match (op, &value) {
            (ComparisonOperator::Contains, Literal::String(s)) => like(self, format!("%{}%", escape_like(s))),
            (ComparisonOperator::StartsWith, Literal::String(s)) => like(self, format!("{}%", escape_like(s))),
            (ComparisonOperator::EndsWith, Literal::String(s)) => like(self, format!("%{}", escape_like(s))),
            _ => {
                let symbol = match op {
                    ComparisonOperator::LessThan => "<",
                    ComparisonOperator::LessOrEqual => "<=",
                    ComparisonOperator::GreaterThan => ">",
                    ComparisonOperator::GreaterOrEqual => ">=",
                    _ => "=",
                };
                let ph = self.buf.push_param(value.clone());
                format!("{} {} {}", column, symbol, ph)
            }
        }
    }

    /// Scalar subquery per to-one hop ending in the sort column.
    fn sort_expr(&mut self, outer: &str, field: &FieldChain, hops: &[Hop]) -> String {
        let Some((hop, rest)) = hops.split_first() else {
            return column_ref(outer, &field.attribute.column);
        };
        let alias = self.alias();
        let inner = self.sort_expr(&alias, field, rest);
        format!(
            "(SELECT {} FROM {} {} WHERE {} = {} LIMIT 1)",
            inner,
            qualified_table(&hop.target.schema, &hop.target.table),
            alias,
            column_ref(&alias, &hop.relationship.their_key),
            column_ref(outer, &hop.relationship.our_key)
        )
    }

    fn where_clause(&mut self, filter: Option<&FilterExpression>) -> String {
        match filter {
            Some(f) => format!(" WHERE {}", self.filter(ROOT_ALIAS, f)),
            None => String::new(),
        }
    }
}

const ROOT_ALIAS: &str = "t0";

fn column_ref(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quoted(column))
}

/// SELECT list: floats are cast to float8 so numeric columns decode.
fn select_column_list(resource: &ResourceType, columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| {
            let expr = column_ref(ROOT_ALIAS, c);
            let is_float = resource
                .attributes
                .iter()
                .any(|a| a.column == *c && a.attr_type == AttrType::Float);
            if is_float {
                format!("{}::float8 AS {}", expr, quoted(c))
            } else {
                expr
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Filtered, ordered, windowed SELECT for one store query.
pub fn select_page(query: &StoreQuery) -> QueryBuf {
    let resource = &query.resource;
    let mut w = SqlWriter::new();
    let table = qualified_table(&resource.schema, &resource.table);
    let where_clause = w.where_clause(query.filter.as_ref());
    let order: Vec<String> = query
        .sort
        .iter()
        .map(|key| {
            let expr = w.sort_expr(ROOT_ALIAS, &key.field, &key.field.hops);
            match key.direction {
                SortDirection::Ascending => format!("{} ASC", expr),
                SortDirection::Descending => format!("{} DESC", expr),
            }
        })
        .collect();
    let order_clause = if order.is_empty() {
        String::new()
    } else {
        format!(" ORDER BY {}", order.join(", "))
    };
    let limit_clause = query.window.take.map(|n| format!(" LIMIT {}", n)).unwrap_or_default();
    let offset_clause = match query.window.skip {
        0 => String::new(),
        n => format!(" OFFSET {}", n),
    };
    w.buf.sql = format!(
        "SELECT {} FROM {} {}{}{}{}{}",
        select_column_list(resource, &query.columns),
        table,
        ROOT_ALIAS,
        where_clause,
        order_clause,
        limit_clause,
        offset_clause
    );
    w.buf
}

/// COUNT(*) over the filter only.
pub fn count(resource: &ResourceType, filter: Option<&FilterExpression>) -> QueryBuf {
    let mut w = SqlWriter::new();
    let where_clause = w.where_clause(filter);
    w.buf.sql = format!(
        "SELECT COUNT(*) AS \"count\" FROM {} {}{}",
        qualified_table(&resource.schema, &resource.table),
        ROOT_ALIAS,
        where_clause
    );
    w.buf
}
