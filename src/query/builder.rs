//! Resolves a `RawQuerySet` against the resource graph and merges server defaults.

use crate::config::ApiOptions;
use crate::definition::ResourceDefinitions;
use crate::error::QueryError;
use crate::graph::{ResourceGraph, ResourceType};
use crate::query::expression::*;
use crate::query::parser::QueryStringParser;
use crate::query::raw::*;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

pub struct QueryLayerBuilder<'a> {
    graph: &'a ResourceGraph,
    options: &'a ApiOptions,
    definitions: Option<&'a ResourceDefinitions>,
}

impl<'a> QueryLayerBuilder<'a> {
    pub fn new(graph: &'a ResourceGraph, options: &'a ApiOptions) -> Self {
        QueryLayerBuilder {
            graph,
            options,
            definitions: None,
        }
    }

    pub fn with_definitions(mut self, definitions: &'a ResourceDefinitions) -> Self {
        self.definitions = Some(definitions);
        self
    }

    /// Fails on the first problem, checked in order: filter, sort, include, fields, pagination.
    pub fn build(&self, raw: &RawQuerySet, root: &Arc<ResourceType>) -> Result<QueryLayer, QueryError> {
        let client_filters = raw
            .filters
            .iter()
            .map(|f| Self::resolve_filter(self.graph, root, f))
            .collect::<Result<Vec<_>, _>>()?;
        let client_sort = raw
            .sort
            .as_ref()
            .map(|s| Self::resolve_sort(self.graph, root, s))
            .transpose()?;
        let includes = self.resolve_includes(&raw.includes, root)?;
        let fields = self.resolve_fields(&raw.fields)?;
        let pagination = self.resolve_pagination(&raw.page, root);

        let default_filter = match &root.defaults.filter {
            Some(text) => {
                let parsed = QueryStringParser::parse_filter_expression("filter", text)?;
                Some(Self::resolve_filter(self.graph, root, &parsed)?)
            }
            None => None,
        };
        let mut filter = FilterExpression::and(default_filter.into_iter().chain(client_filters));
        let mut sort = match (client_sort, &root.defaults.sort) {
            (Some(sort), _) => sort,
            (None, Some(text)) => {
                let parsed = QueryStringParser::parse_sort("sort", text)?;
                Self::resolve_sort(self.graph, root, &parsed)?
            }
            (None, None) => SortExpression::default(),
        };
        if let Some(definition) = self.definitions.and_then(|d| d.get(&root.public_name)) {
            filter = definition.on_apply_filter(root, filter);
            sort = definition.on_apply_sort(root, sort);
        }

        Ok(QueryLayer {
            resource: root.clone(),
            filter,
            sort,
            includes,
            pagination,
            fields,
            include_total_count: self.options.include_total_count,
        })
    }

    pub fn resolve_filter(
        graph: &ResourceGraph,
        resource: &Arc<ResourceType>,
        raw: &RawFilterParam,
    ) -> Result<FilterExpression, QueryError> {
        resolve_filter_node(graph, resource, &raw.parameter, &raw.filter)
    }

    /// Keys must be sortable attributes reached through to-one relationships, each at most once.
    pub fn resolve_sort(
        graph: &ResourceGraph,
        resource: &Arc<ResourceType>,
        raw: &RawSort,
    ) -> Result<SortExpression, QueryError> {
        let invalid = |field: String, reason: String| QueryError::InvalidSortTarget {
            parameter: raw.parameter.clone(),
            field,
            reason,
        };
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(raw.keys.len());
        for key in &raw.keys {
            let field = resolve_field_chain(graph, resource, &key.path, true, &invalid)?;
            if !field.attribute.capabilities.sort {
                return Err(invalid(field.path(), "attribute is not sortable".to_string()));
            }
            if !seen.insert(field.path()) {
                return Err(QueryError::DuplicateSortKey {
                    parameter: raw.parameter.clone(),
                    field: field.path(),
                });
            }
            keys.push(SortKey {
                field,
                direction: key.direction,
            });
        }
        Ok(SortExpression { keys })
    }

    fn resolve_includes(
        &self,
        chains: &[Vec<String>],
        root: &Arc<ResourceType>,
    ) -> Result<Vec<InclusionChain>, QueryError> {
        let mut resolved: Vec<InclusionChain> = Vec::with_capacity(chains.len());
        for names in chains {
            let chain = names.join(".");
            let invalid = |hop: &str, reason: String| QueryError::InvalidInclusionChain {
                parameter: "include".to_string(),
                chain: chain.clone(),
                hop: hop.to_string(),
                reason,
            };
            let mut current = root.clone();
            let mut hops = Vec::with_capacity(names.len());
            for name in names {
                let relationship = current
                    .relationship(name)
                    .ok_or_else(|| invalid(name, format!("does not exist on '{}'", current.public_name)))?;
                if !relationship.includable {
                    return Err(invalid(name, "is not includable".to_string()));
                }
                let target = self.graph.target_of(relationship)?;
                hops.push(Hop {
                    relationship: relationship.clone(),
                    target: target.clone(),
                });
                current = target;
            }
            let chain = InclusionChain { hops };
            if !resolved.contains(&chain) {
                resolved.push(chain);
            }
        }
        Ok(resolved)
    }

    fn resolve_fields(
        &self,
        fields: &std::collections::BTreeMap<String, Vec<String>>,
    ) -> Result<SparseFieldSets, QueryError> {
        let mut sets = SparseFieldSets::default();
        let mut seen = HashSet::new();
        for (type_name, names) in fields {
            let parameter = format!("fields[{}]", type_name);
            let resource = self.graph.resolve(type_name).map_err(|_| QueryError::UnknownResource {
                name: type_name.clone(),
                parameter: Some(parameter.clone()),
            })?;
            if !seen.insert(resource.public_name.clone()) {
                return Err(QueryError::MalformedQueryParameter {
                    parameter,
                    value: names.join(","),
                    message: "fields for this type may only be specified once".to_string(),
                });
            }
            let mut selected = BTreeSet::new();
            for name in names {
                if name == "id" || resource.attribute(name).is_none() {
                    return Err(QueryError::InvalidSparseField {
                        parameter,
                        resource: resource.public_name.clone(),
                        field: name.clone(),
                    });
                }
                selected.insert(name.clone());
            }
            sets.insert(&resource.public_name, selected);
        }
        Ok(sets)
    }

    /// Size precedence: client, resource default, global default. 0 asks for unlimited.
    fn resolve_pagination(&self, page: &RawPage, root: &ResourceType) -> PaginationSpec {
        let requested = page
            .size
            .or(root.defaults.page_size)
            .or(self.options.default_page_size)
            .filter(|&n| n > 0);
        let size = match (requested, self.options.max_page_size.filter(|&n| n > 0)) {
            (Some(n), Some(max)) if n > max => {
                tracing::warn!(requested = n, max, resource = %root.public_name, "page size clamped");
                Some(max)
            }
            (None, Some(max)) => Some(max),
            (n, _) => n,
        };
        PaginationSpec {
            size,
            number: page.number.unwrap_or(1),
        }
    }
}

fn resolve_filter_node(
    graph: &ResourceGraph,
    resource: &Arc<ResourceType>,
    parameter: &str,
    raw: &RawFilter,
) -> Result<FilterExpression, QueryError> {
    let invalid = |field: String, reason: String| QueryError::InvalidFilterTarget {
        parameter: parameter.to_string(),
        field,
        reason,
    };
    let bad_value = |value: &str, message: String| QueryError::InvalidFilterValue {
        parameter: parameter.to_string(),
        value: value.to_string(),
        message,
    };
    Ok(match raw {
        RawFilter::Compare { path, op, value } => {
            let field = filterable_field(graph, resource, path, &invalid)?;
            if op.is_text_match() && !field.attribute.attr_type.is_text() {
                return Err(invalid(field.path(), "text matching requires a string attribute".to_string()));
            }
            let value = match value {
                RawLiteral::Null if *op != ComparisonOperator::Equals => {
                    return Err(bad_value("null", "null can only be compared for equality".to_string()));
                }
                RawLiteral::Null => Literal::Null,
                RawLiteral::Text(text) => {
                    Literal::parse(text, field.attribute.attr_type).map_err(|m| bad_value(text, m))?
                }
            };
            FilterExpression::Comparison { field, op: *op, value }
        }
        RawFilter::Any { path, values } => {
            let field = filterable_field(graph, resource, path, &invalid)?;
            let values = values
                .iter()
                .map(|v| Literal::parse(v, field.attribute.attr_type).map_err(|m| bad_value(v, m)))
                .collect::<Result<Vec<_>, _>>()?;
            FilterExpression::Any { field, values }
        }
        RawFilter::Has { path, filter } => {
            let hops = resolve_hops(graph, resource, path, false, &invalid)?;
            let filter = match (filter, hops.last()) {
                (Some(inner), Some(last)) => {
                    Some(Box::new(resolve_filter_node(graph, &last.target, parameter, inner)?))
                }
                _ => None,
            };
            FilterExpression::Has { hops, filter }
        }
        RawFilter::Not(inner) => FilterExpression::Not(Box::new(resolve_filter_node(graph, resource, parameter, inner)?)),
        RawFilter::And(terms) | RawFilter::Or(terms) => {
            let op = if matches!(raw, RawFilter::And(_)) {
                LogicalOperator::And
            } else {
                LogicalOperator::Or
            };
            let terms = terms
                .iter()
                .map(|t| resolve_filter_node(graph, resource, parameter, t))
                .collect::<Result<Vec<_>, _>>()?;
            FilterExpression::Logical { op, terms }
        }
    })
}

fn filterable_field(
    graph: &ResourceGraph,
    resource: &Arc<ResourceType>,
    path: &[String],
    invalid: &dyn Fn(String, String) -> QueryError,
) -> Result<FieldChain, QueryError> {
    let field = resolve_field_chain(graph, resource, path, false, invalid)?;
    if !field.attribute.capabilities.filter {
        return Err(invalid(field.path(), "attribute is not filterable".to_string()));
    }
    Ok(field)
}

/// All segments must be relationships.
fn resolve_hops(
    graph: &ResourceGraph,
    resource: &Arc<ResourceType>,
    path: &[String],
    to_one_only: bool,
    invalid: &dyn Fn(String, String) -> QueryError,
) -> Result<Vec<Hop>, QueryError> {
    let mut current = resource.clone();
    let mut hops = Vec::with_capacity(path.len());
    for name in path {
        let relationship = current.relationship(name).ok_or_else(|| {
            invalid(
                path.join("."),
                format!("'{}' is not a relationship of '{}'", name, current.public_name),
            )
        })?;
        if to_one_only && relationship.is_to_many() {
            return Err(invalid(
                path.join("."),
                format!("'{}' is a to-many relationship", name),
            ));
        }
        let target = graph.target_of(relationship)?;
        hops.push(Hop {
            relationship: relationship.clone(),
            target: target.clone(),
        });
        current = target;
    }
    Ok(hops)
}

/// Relationship hops followed by one attribute.
fn resolve_field_chain(
    graph: &ResourceGraph,
    resource: &Arc<ResourceType>,
    path: &[String],
    to_one_only: bool,
    invalid: &dyn Fn(String, String) -> QueryError,
) -> Result<FieldChain, QueryError> {
    let (last, relationships) = match path.split_last() {
        Some(split) => split,
        None => return Err(invalid(String::new(), "empty field path".to_string())),
    };
    let hops = resolve_hops(graph, resource, relationships, to_one_only, invalid)
        .map_err(|e| match e {
            QueryError::InvalidFilterTarget { parameter, reason, .. } => QueryError::InvalidFilterTarget {
                parameter,
                field: path.join("."),
                reason,
            },
            QueryError::InvalidSortTarget { parameter, reason, .. } => QueryError::InvalidSortTarget {
                parameter,
                field: path.join("."),
                reason,
            },
            other => other,
        })?;
    let owner = hops.last().map(|h| h.target.clone()).unwrap_or_else(|| resource.clone());
    let attribute = match owner.attribute(last) {
        Some(attribute) => attribute,
        None if owner.relationship(last).is_some() => {
            return Err(invalid(
                path.join("."),
                format!("'{}' is a relationship, not an attribute", last),
            ))
        }
        None => {
            return Err(invalid(
                path.join("."),
                format!("'{}' is not an attribute of '{}'", last, owner.public_name),
            ))
        }
    };
    Ok(FieldChain { hops, attribute })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PluralizationStrategy;
    use crate::definition::ResourceDefinition;
    use crate::fixtures::blog_graph;
    use crate::graph::{AttrType, Attribute, ResourceGraphBuilder, ResourceTypeBuilder, SortDirection};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    fn raw(root: &ResourceType, pairs: &[(&str, &str)]) -> RawQuerySet {
        let params: Vec<(String, String)> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        QueryStringParser::new(&ApiOptions::default()).parse(&params, root).unwrap()
    }

    fn build_with(options: &ApiOptions, pairs: &[(&str, &str)]) -> Result<QueryLayer, QueryError> {
        let graph = blog_graph();
        let root = graph.resolve("articles").unwrap();
        QueryLayerBuilder::new(&graph, options).build(&raw(&root, pairs), &root)
    }

    fn build(pairs: &[(&str, &str)]) -> Result<QueryLayer, QueryError> {
        build_with(&ApiOptions::default(), pairs)
    }

    #[test]
    fn test_build_is_idempotent() {
        let pairs = [
            ("filter[author.name]", "Ann"),
            ("sort", "-publishedAt,title"),
            ("include", "comments.author"),
            ("fields[articles]", "title"),
        ];
        assert_eq!(build(&pairs).unwrap(), build(&pairs).unwrap());
    }

    #[test]
    fn test_bracket_filters_are_and_ed() {
        let layer = build(&[("filter[title]", "x"), ("filter[wordCount]", "gt:100")]).unwrap();
        assert_matches!(
            layer.filter,
            Some(FilterExpression::Logical { op: LogicalOperator::And, ref terms }) if terms.len() == 2
        );
    }

    #[test]
    fn test_relationship_filter_resolves_chain() {
        let layer = build(&[("filter[author.name]", "Ann")]).unwrap();
        match layer.filter {
            Some(FilterExpression::Comparison { field, op, value }) => {
                assert_eq!(field.path(), "author.name");
                assert_eq!(field.hops[0].target.public_name, "people");
                assert_eq!(op, ComparisonOperator::Equals);
                assert_eq!(value, Literal::String("Ann".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_filter_errors() {
        assert_matches!(
            build(&[("filter[nope]", "x")]),
            Err(QueryError::InvalidFilterTarget { field, .. }) if field == "nope"
        );
        assert_matches!(
            build(&[("filter[secret]", "x")]),
            Err(QueryError::InvalidFilterTarget { reason, .. }) if reason.contains("not filterable")
        );
        assert_matches!(
            build(&[("filter[wordCount]", "like:12")]),
            Err(QueryError::InvalidFilterTarget { reason, .. }) if reason.contains("string")
        );
        assert_matches!(
            build(&[("filter[wordCount]", "many")]),
            Err(QueryError::InvalidFilterValue { value, .. }) if value == "many"
        );
        assert_matches!(
            build(&[("filter[author]", "x")]),
            Err(QueryError::InvalidFilterTarget { reason, .. }) if reason.contains("relationship")
        );
        assert_matches!(
            build(&[("filter", "has(title)")]),
            Err(QueryError::InvalidFilterTarget { .. })
        );
    }

    #[test]
    fn test_has_filter_is_relative_to_target() {
        let layer = build(&[("filter", "has(comments,equals(author.name,'Bob'))")]).unwrap();
        match layer.filter {
            Some(FilterExpression::Has { hops, filter: Some(inner) }) => {
                assert_eq!(hops[0].relationship.public_name, "comments");
                assert_matches!(*inner, FilterExpression::Comparison { ref field, .. } if field.hops[0].target.public_name == "people");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_sort_resolution() {
        let layer = build(&[("sort", "-author.name,id")]).unwrap();
        let keys: Vec<(String, SortDirection)> = layer.sort.keys.iter().map(|k| (k.field.path(), k.direction)).collect();
        assert_eq!(
            keys,
            vec![
                ("author.name".to_string(), SortDirection::Descending),
                ("id".to_string(), SortDirection::Ascending)
            ]
        );
    }

    #[test]
    fn test_sort_errors() {
        assert_matches!(build(&[("sort", "comments.body")]), Err(QueryError::InvalidSortTarget { .. }));
        assert_matches!(build(&[("sort", "secret")]), Err(QueryError::InvalidSortTarget { .. }));
        assert_matches!(
            build(&[("sort", "title,-title")]),
            Err(QueryError::DuplicateSortKey { field, .. }) if field == "title"
        );
    }

    #[test]
    fn test_include_errors() {
        assert_matches!(
            build(&[("include", "comments.nope")]),
            Err(QueryError::InvalidInclusionChain { hop, chain, .. }) if hop == "nope" && chain == "comments.nope"
        );
        assert_matches!(
            build(&[("include", "editor")]),
            Err(QueryError::InvalidInclusionChain { reason, .. }) if reason.contains("not includable")
        );
    }

    #[test]
    fn test_fieldset_errors() {
        assert_matches!(
            build(&[("fields[widgets]", "name")]),
            Err(QueryError::UnknownResource { parameter: Some(p), .. }) if p == "fields[widgets]"
        );
        assert_matches!(
            build(&[("fields[people]", "age")]),
            Err(QueryError::InvalidSparseField { field, .. }) if field == "age"
        );
        assert_matches!(build(&[("fields[articles]", "author")]), Err(QueryError::InvalidSparseField { .. }));
    }

    #[test]
    fn test_fieldset_for_one_type_twice_is_malformed() {
        let graph = blog_graph();
        let root = graph.resolve("articles").unwrap();
        let mut raw = RawQuerySet::default();
        raw.fields.insert("Articles".to_string(), vec!["title".to_string()]);
        raw.fields.insert("articles".to_string(), vec!["body".to_string()]);
        assert_matches!(
            QueryLayerBuilder::new(&graph, &ApiOptions::default()).build(&raw, &root),
            Err(QueryError::MalformedQueryParameter { parameter, .. }) if parameter == "fields[articles]"
        );
    }

    #[test]
    fn test_errors_reported_in_order() {
        let err = build(&[
            ("fields[widgets]", "x"),
            ("include", "nope"),
            ("sort", "nope"),
            ("filter[nope]", "x"),
        ])
        .unwrap_err();
        assert_matches!(err, QueryError::InvalidFilterTarget { .. });
        let err = build(&[("fields[widgets]", "x"), ("include", "nope"), ("sort", "nope")]).unwrap_err();
        assert_matches!(err, QueryError::InvalidSortTarget { .. });
        let err = build(&[("fields[widgets]", "x"), ("include", "nope")]).unwrap_err();
        assert_matches!(err, QueryError::InvalidInclusionChain { .. });
    }

    #[test]
    fn test_page_size_is_clamped() {
        let options = ApiOptions {
            max_page_size: Some(50),
            ..ApiOptions::default()
        };
        let layer = build_with(&options, &[("page[size]", "100")]).unwrap();
        assert_eq!(layer.pagination.size, Some(50));
        let layer = build_with(&options, &[("page[size]", "0")]).unwrap();
        assert_eq!(layer.pagination.size, Some(50));
        let layer = build(&[("page[size]", "0")]).unwrap();
        assert_eq!(layer.pagination.size, None);
        let layer = build(&[("page[number]", "3")]).unwrap();
        assert_eq!(layer.pagination, PaginationSpec { size: Some(10), number: 3 });
    }

    #[test]
    fn test_zero_max_page_size_is_unbounded() {
        let options = ApiOptions {
            max_page_size: Some(0),
            ..ApiOptions::default()
        };
        let layer = build_with(&options, &[("page[size]", "7")]).unwrap();
        assert_eq!(layer.pagination.size, Some(7));
        let layer = build_with(&options, &[("page[size]", "0")]).unwrap();
        assert_eq!(layer.pagination.size, None);
    }

    fn task_graph() -> ResourceGraph {
        ResourceGraphBuilder::new(PluralizationStrategy::English)
            .register(
                ResourceTypeBuilder::new("Task")
                    .attribute(Attribute::new("title", AttrType::String))
                    .attribute(Attribute::new("priority", AttrType::Integer))
                    .attribute(Attribute::new("archived", AttrType::Boolean))
                    .default_sort("-priority")
                    .default_filter("equals(archived,'false')")
                    .default_page_size(25),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_server_defaults_merge() {
        let graph = task_graph();
        let options = ApiOptions::default();
        let root = graph.resolve("tasks").unwrap();
        let builder = QueryLayerBuilder::new(&graph, &options);

        let layer = builder.build(&raw(&root, &[]), &root).unwrap();
        assert_eq!(layer.sort.keys[0].field.path(), "priority");
        assert_eq!(layer.pagination.size, Some(25));
        assert_matches!(layer.filter, Some(FilterExpression::Comparison { .. }));

        let layer = builder
            .build(&raw(&root, &[("sort", "title"), ("filter[title]", "x"), ("page[size]", "5")]), &root)
            .unwrap();
        assert_eq!(layer.sort.keys.len(), 1);
        assert_eq!(layer.sort.keys[0].field.path(), "title");
        assert_eq!(layer.pagination.size, Some(5));
        match layer.filter {
            Some(FilterExpression::Logical { op: LogicalOperator::And, terms }) => {
                assert_matches!(&terms[0], FilterExpression::Comparison { field, .. } if field.path() == "archived");
                assert_matches!(&terms[1], FilterExpression::Comparison { field, .. } if field.path() == "title");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    struct OnlyHighPriority;

    impl ResourceDefinition for OnlyHighPriority {
        fn on_apply_sort(&self, _resource: &ResourceType, sort: SortExpression) -> SortExpression {
            SortExpression {
                keys: sort.keys.into_iter().rev().collect(),
            }
        }

        fn on_apply_filter(&self, resource: &ResourceType, filter: Option<FilterExpression>) -> Option<FilterExpression> {
            let high = FilterExpression::Comparison {
                field: FieldChain::attribute(resource.attribute("priority").unwrap()),
                op: ComparisonOperator::GreaterOrEqual,
                value: Literal::Integer(5),
            };
            FilterExpression::and(filter.into_iter().chain(Some(high)))
        }
    }

    #[test]
    fn test_definition_hooks_apply_after_defaults() {
        let graph = task_graph();
        let options = ApiOptions::default();
        let definitions = ResourceDefinitions::new().register("tasks", OnlyHighPriority);
        let root = graph.resolve("tasks").unwrap();
        let layer = QueryLayerBuilder::new(&graph, &options)
            .with_definitions(&definitions)
            .build(&raw(&root, &[("sort", "title,priority")]), &root)
            .unwrap();
        let paths: Vec<String> = layer.sort.keys.iter().map(|k| k.field.path()).collect();
        assert_eq!(paths, vec!["priority".to_string(), "title".to_string()]);
        assert_matches!(
            layer.filter,
            Some(FilterExpression::Logical { ref terms, .. }) if terms.len() == 2
        );
    }
}
