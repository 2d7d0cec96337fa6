//! Typed errors and HTTP mapping.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Startup errors: resource configuration and graph construction.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate {kind}: {name}")]
    Duplicate { kind: &'static str, name: String },
    #[error("invalid member name: {0}")]
    InvalidMemberName(String),
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Client input errors raised while parsing or building a query layer.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("malformed query parameter '{parameter}': {message}")]
    MalformedQueryParameter {
        parameter: String,
        value: String,
        message: String,
    },
    #[error("unknown resource type '{name}'")]
    UnknownResource { name: String, parameter: Option<String> },
    #[error("field '{field}' cannot be used for filtering: {reason}")]
    InvalidFilterTarget {
        parameter: String,
        field: String,
        reason: String,
    },
    #[error("invalid filter value '{value}': {message}")]
    InvalidFilterValue {
        parameter: String,
        value: String,
        message: String,
    },
    #[error("field '{field}' cannot be used for sorting: {reason}")]
    InvalidSortTarget {
        parameter: String,
        field: String,
        reason: String,
    },
    #[error("sort field '{field}' is specified more than once")]
    DuplicateSortKey { parameter: String, field: String },
    #[error("relationship '{hop}' in inclusion chain '{chain}' {reason}")]
    InvalidInclusionChain {
        parameter: String,
        chain: String,
        hop: String,
        reason: String,
    },
    #[error("resource type '{resource}' has no attribute '{field}'")]
    InvalidSparseField {
        parameter: String,
        resource: String,
        field: String,
    },
}

impl QueryError {
    pub(crate) fn malformed(parameter: &str, value: &str, message: impl Into<String>) -> Self {
        QueryError::MalformedQueryParameter {
            parameter: parameter.to_string(),
            value: value.to_string(),
            message: message.into(),
        }
    }

    /// Query string parameter the error refers to, if any.
    pub fn parameter(&self) -> Option<&str> {
        match self {
            QueryError::MalformedQueryParameter { parameter, .. }
            | QueryError::InvalidFilterTarget { parameter, .. }
            | QueryError::InvalidFilterValue { parameter, .. }
            | QueryError::InvalidSortTarget { parameter, .. }
            | QueryError::DuplicateSortKey { parameter, .. }
            | QueryError::InvalidInclusionChain { parameter, .. }
            | QueryError::InvalidSparseField { parameter, .. } => Some(parameter),
            QueryError::UnknownResource { parameter, .. } => parameter.as_deref(),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            QueryError::MalformedQueryParameter { .. } => "malformed_query_parameter",
            QueryError::UnknownResource { .. } => "unknown_resource",
            QueryError::InvalidFilterTarget { .. } => "invalid_filter_target",
            QueryError::InvalidFilterValue { .. } => "invalid_filter_value",
            QueryError::InvalidSortTarget { .. } => "invalid_sort_target",
            QueryError::DuplicateSortKey { .. } => "duplicate_sort_key",
            QueryError::InvalidInclusionChain { .. } => "invalid_inclusion_chain",
            QueryError::InvalidSparseField { .. } => "invalid_sparse_field",
        }
    }
}

/// Store-level failures. Never retried inside the core.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("request cancelled")]
    Cancelled,
    #[error("store timed out")]
    Timeout,
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

/// A materialized record violates an internal invariant (e.g. no identity).
#[derive(Error, Debug)]
#[error("cannot serialize '{resource}' resource: {message}")]
pub struct SerializationError {
    pub resource: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    DataAccess(#[from] DataAccessError),
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// JSON:API top-level errors document.
#[derive(Serialize, Debug)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorObject>,
}

#[derive(Serialize, Debug)]
pub struct ErrorObject {
    pub status: String,
    pub code: String,
    pub title: String,
    pub detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

#[derive(Serialize, Debug)]
pub struct ErrorSource {
    pub parameter: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Query(QueryError::UnknownResource { parameter: None, .. }) => StatusCode::NOT_FOUND,
            AppError::Query(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::DataAccess(DataAccessError::Timeout) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DataAccess(DataAccessError::Db(sqlx::Error::PoolTimedOut)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::DataAccess(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Build the JSON:API error object. Internal failures get a generic detail.
    pub fn to_error_object(&self) -> ErrorObject {
        let status = self.status();
        let (code, title, detail, parameter) = match self {
            AppError::Query(e) => (
                e.code(),
                "Invalid query string parameter",
                e.to_string(),
                e.parameter().map(String::from),
            ),
            AppError::NotFound(_) => ("not_found", "Resource not found", self.to_string(), None),
            AppError::Config(_) => ("config_error", "Server configuration error", "An internal error occurred.".to_string(), None),
            AppError::DataAccess(_) => ("data_access_error", "Data store failure", "The data store could not complete the request.".to_string(), None),
            AppError::Serialization(_) => ("internal_error", "Internal server error", "An internal error occurred.".to_string(), None),
        };
        ErrorObject {
            status: status.as_u16().to_string(),
            code: code.to_string(),
            title: title.to_string(),
            detail,
            source: parameter.map(|parameter| ErrorSource { parameter }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorDocument {
            errors: vec![self.to_error_object()],
        };
        (
            status,
            [(header::CONTENT_TYPE, crate::response::JSONAPI_MEDIA_TYPE)],
            Json(body),
        )
            .into_response()
    }
}
