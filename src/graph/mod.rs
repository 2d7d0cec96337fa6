//! Resource graph: read-only registry of exposed resource types, built once at startup.

mod builder;
mod resource;

pub use builder::{ResourceGraphBuilder, ResourceTypeBuilder};
pub use resource::*;

use crate::case::to_kebab_case;
use crate::error::QueryError;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug)]
pub struct ResourceGraph {
    resources: Vec<Arc<ResourceType>>,
    by_name: HashMap<String, usize>,
    by_model: HashMap<String, usize>,
}

impl ResourceGraph {
    pub(crate) fn from_resources(resources: Vec<Arc<ResourceType>>) -> Self {
        let by_name = resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.public_name.clone(), i))
            .collect();
        let by_model = resources.iter().enumerate().map(|(i, r)| (r.model.clone(), i)).collect();
        ResourceGraph {
            resources,
            by_name,
            by_model,
        }
    }

    /// Look up by public name. Case-insensitive and kebab normalized: "TodoItems", "todo_items" and "todo-items" match.
    pub fn resolve(&self, public_name: &str) -> Result<Arc<ResourceType>, QueryError> {
        self.by_name
            .get(&to_kebab_case(public_name))
            .map(|&i| self.resources[i].clone())
            .ok_or_else(|| QueryError::UnknownResource {
                name: public_name.to_string(),
                parameter: None,
            })
    }

    /// Look up by backing model identity (exact match).
    pub fn resolve_model(&self, model: &str) -> Result<Arc<ResourceType>, QueryError> {
        self.by_model
            .get(model)
            .map(|&i| self.resources[i].clone())
            .ok_or_else(|| QueryError::UnknownResource {
                name: model.to_string(),
                parameter: None,
            })
    }

    /// Target type of a relationship. Always present in a built graph.
    pub fn target_of(&self, relationship: &Relationship) -> Result<Arc<ResourceType>, QueryError> {
        self.resolve(&relationship.target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ResourceType>> {
        self.resources.iter()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluralizationStrategy;
    use assert_matches::assert_matches;

    fn graph() -> ResourceGraph {
        ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(ResourceTypeBuilder::new("TodoItem").attribute(Attribute::new("description", AttrType::String)))
            .build()
            .unwrap()
    }

    #[test]
    fn test_resolve_is_case_and_separator_insensitive() {
        let graph = graph();
        for name in ["todo-items", "TodoItems", "todo_items", "TODO-ITEMS"] {
            assert_eq!(graph.resolve(name).unwrap().model, "TodoItem", "{}", name);
        }
    }

    #[test]
    fn test_resolve_model() {
        let graph = graph();
        assert_eq!(graph.resolve_model("TodoItem").unwrap().public_name, "todo-items");
        assert_matches!(graph.resolve_model("todo-items"), Err(QueryError::UnknownResource { .. }));
    }

    #[test]
    fn test_unknown_resource() {
        assert_matches!(
            graph().resolve("people"),
            Err(QueryError::UnknownResource { name, .. }) if name == "people"
        );
    }
}
