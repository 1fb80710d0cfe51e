//! Engine configuration.

use crate::error::Result;
use crate::fields::FieldMap;
use crate::schema::Schema;
use crate::xpath::QueryOptions;
use std::sync::Arc;

/// Everything the engine needs besides the document itself: the schema, the
/// field mapping table compiled from it, and the query evaluator settings.
///
/// Contexts are cheap to clone; the schema is shared.
#[derive(Debug, Clone)]
pub struct MarkingContext {
    schema: Arc<Schema>,
    fields: FieldMap,
    query: QueryOptions,
}

impl MarkingContext {
    /// Validates `schema` and builds a context around it.
    pub fn new(schema: Schema) -> Result<Self> {
        schema.validate()?;
        Ok(Self::build(Arc::new(schema)))
    }

    /// Context for the built-in STIX schema.
    pub fn stix() -> Self {
        Self::build(Arc::new(Schema::stix()))
    }

    fn build(schema: Arc<Schema>) -> Self {
        Self {
            fields: FieldMap::compile(&schema),
            schema,
            query: QueryOptions::default(),
        }
    }

    pub fn with_query_options(mut self, query: QueryOptions) -> Self {
        self.query = query;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn schema_arc(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    pub fn query_options(&self) -> &QueryOptions {
        &self.query
    }
}

impl Default for MarkingContext {
    fn default() -> Self {
        Self::stix()
    }
}
