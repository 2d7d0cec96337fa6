//! Per-resource strategy hooks, registered by public resource name.

use crate::graph::ResourceType;
use crate::query::{FilterExpression, SortExpression};
use crate::repository::Record;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Customizes how queries for one resource type are built and rendered.
///
/// Hooks run after server defaults have been merged into the client input.
/// Every method has a pass-through default.
pub trait ResourceDefinition: Send + Sync {
    /// Replace the effective filter. `None` means unfiltered.
    fn on_apply_filter(&self, _resource: &ResourceType, filter: Option<FilterExpression>) -> Option<FilterExpression> {
        filter
    }

    /// Replace the effective sort.
    fn on_apply_sort(&self, _resource: &ResourceType, sort: SortExpression) -> SortExpression {
        sort
    }

    /// Resource-level `meta` for one serialized record.
    fn get_meta(&self, _resource: &ResourceType, _record: &Record) -> Option<Map<String, Value>> {
        None
    }
}

#[derive(Clone, Default)]
pub struct ResourceDefinitions {
    by_resource: HashMap<String, Arc<dyn ResourceDefinition>>,
}

impl ResourceDefinitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// `resource` is the public name, e.g. "articles".
    pub fn register(mut self, resource: &str, definition: impl ResourceDefinition + 'static) -> Self {
        self.by_resource
            .insert(crate::case::to_kebab_case(resource), Arc::new(definition));
        self
    }

    pub fn get(&self, resource: &str) -> Option<&Arc<dyn ResourceDefinition>> {
        self.by_resource.get(resource)
    }
}

impl std::fmt::Debug for ResourceDefinitions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceDefinitions")
            .field("resources", &self.by_resource.keys().collect::<Vec<_>>())
            .finish()
    }
}
