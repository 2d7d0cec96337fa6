//! Parse -> build -> execute -> serialize, for collection and single-resource reads.

use crate::config::ApiOptions;
use crate::definition::ResourceDefinitions;
use crate::document::{Document, DocumentSerializer, RequestLinks};
use crate::error::{AppError, QueryError};
use crate::graph::{ResourceGraph, ResourceType};
use crate::query::*;
use crate::repository::{DataSource, Repository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct JsonApiPipeline {
    graph: Arc<ResourceGraph>,
    options: ApiOptions,
    parser: QueryStringParser,
    definitions: ResourceDefinitions,
    repository: Repository,
    serializer: DocumentSerializer,
}

impl JsonApiPipeline {
    pub fn new(graph: Arc<ResourceGraph>, options: ApiOptions) -> Self {
        JsonApiPipeline {
            parser: QueryStringParser::new(&options),
            definitions: ResourceDefinitions::default(),
            repository: Repository::new(graph.clone()),
            serializer: DocumentSerializer::new(graph.clone(), &options),
            graph,
            options,
        }
    }

    pub fn with_definitions(mut self, definitions: ResourceDefinitions) -> Self {
        self.serializer = DocumentSerializer::new(self.graph.clone(), &self.options).with_definitions(definitions.clone());
        self.definitions = definitions;
        self
    }

    /// Replace the parser, e.g. to use a custom filter operator vocabulary.
    pub fn with_parser(mut self, parser: QueryStringParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn graph(&self) -> &Arc<ResourceGraph> {
        &self.graph
    }

    pub fn options(&self) -> &ApiOptions {
        &self.options
    }

    /// Validate a query string against a resource without touching a store.
    pub fn build_layer(&self, root: &Arc<ResourceType>, params: &[(String, String)]) -> Result<QueryLayer, QueryError> {
        let raw = self.parser.parse(params, root)?;
        self.layer_builder().build(&raw, root)
    }

    /// `GET /{resource}`
    pub async fn get_collection(
        &self,
        resource: &str,
        params: &[(String, String)],
        source: &dyn DataSource,
        cancel: &CancellationToken,
    ) -> Result<Document, AppError> {
        let root = self.graph.resolve(resource)?;
        let layer = self.build_layer(&root, params)?;
        let page = self.repository.execute(&layer, source, cancel).await?;
        let request = RequestLinks::new(format!("/{}", root.public_name), params);
        Ok(self.serializer.serialize(&page, &layer, &request)?)
    }

    /// `GET /{resource}/{id}`. Only `include` and `fields` apply; the resource's default filter still does.
    pub async fn get_single(
        &self,
        resource: &str,
        id: &str,
        params: &[(String, String)],
        source: &dyn DataSource,
        cancel: &CancellationToken,
    ) -> Result<Document, AppError> {
        let root = self.graph.resolve(resource)?;
        let id_value = Literal::parse(id, root.id_type.attr_type()).map_err(|message| QueryError::InvalidFilterValue {
            parameter: "id".to_string(),
            value: id.to_string(),
            message,
        })?;
        let raw = self.parser.parse(params, &root)?;
        let raw = RawQuerySet {
            filters: Vec::new(),
            sort: None,
            page: RawPage::default(),
            ..raw
        };
        let mut layer = self.layer_builder().build(&raw, &root)?;
        let by_id = FilterExpression::Comparison {
            field: FieldChain::attribute(root.id_attribute()),
            op: ComparisonOperator::Equals,
            value: id_value,
        };
        layer.filter = FilterExpression::and(layer.filter.take().into_iter().chain(Some(by_id)));
        layer.pagination = PaginationSpec {
            size: Some(1),
            number: 1,
        };
        layer.include_total_count = false;

        let page = self.repository.execute(&layer, source, cancel).await?;
        if page.records.is_empty() {
            return Err(AppError::NotFound(format!("{} '{}'", root.public_name, id)));
        }
        let request = RequestLinks::new(format!("/{}/{}", root.public_name, id), params);
        Ok(self.serializer.serialize_single(&page, &layer, &request)?)
    }

    fn layer_builder(&self) -> QueryLayerBuilder<'_> {
        QueryLayerBuilder::new(&self.graph, &self.options).with_definitions(&self.definitions)
    }
}
