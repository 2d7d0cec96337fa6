//! Config validation: shape checks before the graph builder resolves names.

use crate::config::{FullConfig, RelationshipConfig};
use crate::error::ConfigError;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.resources.is_empty() {
        return Err(ConfigError::Validation("at least one resource required".into()));
    }
    for r in &config.resources {
        if r.model.trim().is_empty() {
            return Err(ConfigError::Validation("resource model must not be empty".into()));
        }
        if r.id.column.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{}: id column must not be empty", r.model)));
        }
        for a in &r.attributes {
            if a.column.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{}: attribute column must not be empty", r.model)));
            }
        }
        for rel in &r.relationships {
            validate_keys(&r.model, rel)?;
        }
        if r.defaults.page_size == Some(0) {
            return Err(ConfigError::Validation(format!(
                "{}: default page_size must be greater than 0",
                r.model
            )));
        }
    }
    Ok(())
}

fn validate_keys(model: &str, rel: &RelationshipConfig) -> Result<(), ConfigError> {
    match (&rel.our_key, &rel.their_key, &rel.foreign_key) {
        (Some(_), Some(_), _) | (None, None, Some(_)) => Ok(()),
        (None, None, None) => Err(ConfigError::MissingReference {
            kind: "foreign_key",
            id: format!("{}.{}", model, rel.name),
        }),
        _ => Err(ConfigError::Validation(format!(
            "{}.{}: our_key and their_key must be given together",
            model, rel.name
        ))),
    }
}
