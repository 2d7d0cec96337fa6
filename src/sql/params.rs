//! Bind typed literals to sqlx queries.

use crate::query::Literal;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

/// Bind one literal with its native PostgreSQL type.
pub fn bind_literal<'q>(query: Query<'q, Postgres, PgArguments>, value: &Literal) -> Query<'q, Postgres, PgArguments> {
    match value.clone() {
        Literal::Null => query.bind(None::<String>),
        Literal::String(s) => query.bind(s),
        Literal::Integer(n) => query.bind(n),
        Literal::Float(f) => query.bind(f),
        Literal::Boolean(b) => query.bind(b),
        Literal::Uuid(u) => query.bind(u),
        Literal::DateTime(d) => query.bind(d),
        Literal::Date(d) => query.bind(d),
        Literal::Json(v) => query.bind(sqlx::types::Json(v)),
    }
}
