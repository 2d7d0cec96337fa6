//! Runtime options consumed by the parser, builder, adapter and serializer.

use crate::case::{pluralize_english, to_kebab_case};
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer, Serialize};

/// How public resource names are derived from model names when not given explicitly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluralizationStrategy {
    /// "TodoItem" -> "todo-item"
    None,
    /// "TodoItem" -> "todo-items"
    #[default]
    English,
}

impl PluralizationStrategy {
    /// Public resource name for a model name.
    pub fn public_name(&self, model: &str) -> String {
        let kebab = to_kebab_case(model);
        match self {
            PluralizationStrategy::None => kebab,
            PluralizationStrategy::English => pluralize_english(&kebab),
        }
    }
}

impl std::str::FromStr for PluralizationStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(PluralizationStrategy::None),
            "english" => Ok(PluralizationStrategy::English),
            _ => Err(ConfigError::Validation(format!(
                "invalid pluralization strategy: {} (expected none or english)",
                s
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiOptions {
    /// Page size used when neither the client nor the resource specifies one. `None` = unlimited.
    #[serde(deserialize_with = "zero_as_unlimited")]
    pub default_page_size: Option<u32>,
    /// Upper bound for page sizes; larger requests are clamped, not rejected.
    #[serde(deserialize_with = "zero_as_unlimited")]
    pub max_page_size: Option<u32>,
    /// Reject unknown query string parameters instead of ignoring them.
    pub strict_query_validation: bool,
    /// Run a count query and emit `meta.total` for collection requests.
    pub include_total_count: bool,
    pub pluralization: PluralizationStrategy,
    /// Prefix for generated links, e.g. "https://api.example.com/api/v1".
    pub base_url: String,
}

impl Default for ApiOptions {
    fn default() -> Self {
        ApiOptions {
            default_page_size: Some(10),
            max_page_size: None,
            strict_query_validation: false,
            include_total_count: true,
            pluralization: PluralizationStrategy::English,
            base_url: String::new(),
        }
    }
}

impl ApiOptions {
    /// Read options from `JSONAPI_*` environment variables; unset variables keep defaults.
    /// A page size of 0 in `JSONAPI_DEFAULT_PAGE_SIZE` means unlimited.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = ApiOptions::default();
        if let Some(v) = lookup("JSONAPI_DEFAULT_PAGE_SIZE") {
            let n = parse_u32("JSONAPI_DEFAULT_PAGE_SIZE", &v)?;
            options.default_page_size = (n > 0).then_some(n);
        }
        if let Some(v) = lookup("JSONAPI_MAX_PAGE_SIZE") {
            let n = parse_u32("JSONAPI_MAX_PAGE_SIZE", &v)?;
            options.max_page_size = (n > 0).then_some(n);
        }
        if let Some(v) = lookup("JSONAPI_STRICT_QUERY_VALIDATION") {
            options.strict_query_validation = parse_bool("JSONAPI_STRICT_QUERY_VALIDATION", &v)?;
        }
        if let Some(v) = lookup("JSONAPI_INCLUDE_TOTAL_COUNT") {
            options.include_total_count = parse_bool("JSONAPI_INCLUDE_TOTAL_COUNT", &v)?;
        }
        if let Some(v) = lookup("JSONAPI_PLURALIZATION") {
            options.pluralization = v.parse()?;
        }
        if let Some(v) = lookup("JSONAPI_BASE_URL") {
            options.base_url = v.trim_end_matches('/').to_string();
        }
        Ok(options)
    }
}

/// A page size of 0 in `options.json` means unlimited, as in the environment.
fn zero_as_unlimited<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u32>::deserialize(deserializer)?.filter(|n| *n > 0))
}

fn parse_u32(key: &str, v: &str) -> Result<u32, ConfigError> {
    v.trim()
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{} must be a non-negative integer, got '{}'", key, v)))
}

fn parse_bool(key: &str, v: &str) -> Result<bool, ConfigError> {
    match v.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::Validation(format!("{} must be a boolean, got '{}'", key, v))),
    }
}
