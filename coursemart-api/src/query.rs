//! Generic query service
//!
//! Every CRUD route goes through here: raw JSON is checked against the
//! table's schema, secret fields are hashed, and results come back as public
//! JSON with secrets removed.

use coursemart_core::{
    Document, Filter, FindQuery, Page, PageRequest, SortDirection, Table, TableSchema,
    UpdateOutcome,
};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::crypto;
use crate::error::{ApiError, ApiResult};
use crate::store::DocumentStore;

/// Page size used when a search request names none
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// What to do with secret fields on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretHandling {
    /// Hash plaintext values with bcrypt
    Hash,
    /// Values are already hashed
    Preserve,
}

/// Sort order of a search request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Order {
    pub field: Option<String>,
    #[serde(default)]
    pub direction: SortDirection,
}

/// Body of a paginated search
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    #[serde(default)]
    pub order: Option<Order>,
}

fn default_page_size() -> u64 {
    DEFAULT_PAGE_SIZE
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            filter: Map::new(),
            search: None,
            fields: Vec::new(),
            page: 0,
            page_size: DEFAULT_PAGE_SIZE,
            order: None,
        }
    }
}

fn into_object(value: Value) -> ApiResult<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ApiError::Validation("Payload must be a JSON object".to_string())),
    }
}

/// Query operations over a document store
pub struct QueryService<'a, D: DocumentStore> {
    store: &'a D,
    bcrypt_cost: u32,
    max_page_size: u64,
}

impl<'a, D: DocumentStore> QueryService<'a, D> {
    pub fn new(store: &'a D, bcrypt_cost: u32, max_page_size: u64) -> Self {
        Self {
            store,
            bcrypt_cost,
            max_page_size,
        }
    }

    fn hash_secrets(&self, schema: &TableSchema, fields: &mut Map<String, Value>) -> ApiResult<()> {
        for name in schema.secret_fields() {
            if let Some(Value::String(plain)) = fields.get(name) {
                let hash = crypto::hash_password(plain, self.bcrypt_cost)
                    .map_err(|e| ApiError::Internal(format!("Failed to hash {}: {}", name, e)))?;
                fields.insert(name.to_string(), Value::String(hash));
            }
        }
        Ok(())
    }

    fn prepare(&self, table: Table, input: Value, secrets: SecretHandling) -> ApiResult<Document> {
        let schema = table.schema();
        let mut fields = schema.prepare_insert(into_object(input)?)?;
        if secrets == SecretHandling::Hash {
            self.hash_secrets(schema, &mut fields)?;
        }
        Ok(Document::new(fields))
    }

    /// Insert one record, returning its public form
    pub fn create(&self, table: Table, input: Value) -> ApiResult<Value> {
        let doc = self.create_with(table, input, SecretHandling::Hash)?;
        Ok(doc.to_public_json(table.schema()))
    }

    /// Insert one record, returning the stored document
    pub fn create_with(
        &self,
        table: Table,
        input: Value,
        secrets: SecretHandling,
    ) -> ApiResult<Document> {
        let doc = self.prepare(table, input, secrets)?;
        self.store.insert(table, vec![doc.clone()])?;
        tracing::debug!(table = %table, id = %doc.id, "Created record");
        Ok(doc)
    }

    /// Insert a batch, all or nothing
    pub fn bulk_create(&self, table: Table, inputs: Value) -> ApiResult<Vec<Value>> {
        let Value::Array(items) = inputs else {
            return Err(ApiError::Validation("Payload must be a JSON array".to_string()));
        };
        if items.is_empty() {
            return Err(ApiError::Validation("Nothing to insert".to_string()));
        }

        let docs = items
            .into_iter()
            .map(|item| self.prepare(table, item, SecretHandling::Hash))
            .collect::<ApiResult<Vec<_>>>()?;

        let schema = table.schema();
        let public = docs.iter().map(|d| d.to_public_json(schema)).collect();
        let count = docs.len();
        self.store.insert(table, docs)?;
        tracing::debug!(table = %table, count, "Bulk created records");
        Ok(public)
    }

    fn filter(&self, table: Table, cond: Map<String, Value>) -> ApiResult<Filter> {
        Ok(Filter::new(table.schema().prepare_conditions(cond)?))
    }

    /// First matching stored document, secret fields included
    pub fn find_one_raw(&self, table: Table, cond: Map<String, Value>) -> ApiResult<Option<Document>> {
        let mut query = FindQuery::new(self.filter(table, cond)?);
        query.limit = Some(1);
        Ok(self.store.find(table, &query)?.into_iter().next())
    }

    pub fn find_one(&self, table: Table, cond: Map<String, Value>) -> ApiResult<Option<Value>> {
        Ok(self
            .find_one_raw(table, cond)?
            .map(|doc| doc.to_public_json(table.schema())))
    }

    pub fn find_many(&self, table: Table, cond: Map<String, Value>) -> ApiResult<Vec<Value>> {
        let query = FindQuery::new(self.filter(table, cond)?);
        let schema = table.schema();
        Ok(self
            .store
            .find(table, &query)?
            .iter()
            .map(|doc| doc.to_public_json(schema))
            .collect())
    }

    /// Paginated text search with total count
    pub fn search(&self, table: Table, request: SearchRequest) -> ApiResult<Page<Value>> {
        if request.page_size == 0 {
            return Err(ApiError::Validation("pageSize must be at least 1".to_string()));
        }
        let schema = table.schema();

        let search = match &request.search {
            Some(term) => schema.prepare_search(term, &request.fields)?,
            None => None,
        };
        let filter = self.filter(table, request.filter)?.with_search(search);

        let order = request.order.unwrap_or_default();
        let sort = schema.prepare_sort(order.field.as_deref(), order.direction)?;

        let page = PageRequest {
            page: request.page,
            page_size: request.page_size.min(self.max_page_size),
        };

        let count = self.store.count(table, &filter)?;
        let query = FindQuery {
            filter,
            sort,
            skip: page.skip(),
            limit: Some(page.page_size),
        };
        let rows = self
            .store
            .find(table, &query)?
            .iter()
            .map(|doc| doc.to_public_json(schema))
            .collect();

        Ok(Page { rows, count })
    }

    /// Apply a partial update to every match
    pub fn update(
        &self,
        table: Table,
        cond: Map<String, Value>,
        patch: Value,
    ) -> ApiResult<UpdateOutcome> {
        if cond.is_empty() {
            return Err(ApiError::Validation(
                "Refusing to update without a condition".to_string(),
            ));
        }
        let schema = table.schema();
        let filter = self.filter(table, cond)?;
        let mut patch = schema.prepare_patch(into_object(patch)?)?;
        self.hash_secrets(schema, &mut patch)?;

        let outcome = self.store.update(table, &filter, &patch)?;
        tracing::debug!(
            table = %table,
            matched = outcome.matched_count,
            modified = outcome.modified_count,
            "Updated records"
        );
        Ok(outcome)
    }

    /// Update with values that are already in stored form
    pub fn update_raw(
        &self,
        table: Table,
        cond: Map<String, Value>,
        patch: Map<String, Value>,
    ) -> ApiResult<UpdateOutcome> {
        let filter = self.filter(table, cond)?;
        if filter.is_empty() {
            return Err(ApiError::Validation(
                "Refusing to update without a condition".to_string(),
            ));
        }
        self.store.update(table, &filter, &patch)
    }

    /// Delete every match
    pub fn delete(&self, table: Table, cond: Map<String, Value>) -> ApiResult<u64> {
        if cond.is_empty() {
            return Err(ApiError::Validation(
                "Refusing to delete without a condition".to_string(),
            ));
        }
        let filter = self.filter(table, cond)?;
        let deleted = self.store.delete(table, &filter)?;
        tracing::debug!(table = %table, deleted, "Deleted records");
        Ok(deleted)
    }

    pub fn find_one_populated(
        &self,
        table: Table,
        cond: Map<String, Value>,
        populate: &[String],
    ) -> ApiResult<Option<Value>> {
        let relations = self.relations(table, populate)?;
        Ok(self
            .find_one(table, cond)?
            .map(|row| self.populate_row(row, &relations)))
    }

    pub fn find_many_populated(
        &self,
        table: Table,
        cond: Map<String, Value>,
        populate: &[String],
    ) -> ApiResult<Vec<Value>> {
        let relations = self.relations(table, populate)?;
        Ok(self
            .find_many(table, cond)?
            .into_iter()
            .map(|row| self.populate_row(row, &relations))
            .collect())
    }

    fn relations(&self, table: Table, names: &[String]) -> ApiResult<Vec<(&'static str, Table)>> {
        let schema = table.schema();
        names
            .iter()
            .map(|name| name.trim())
            .filter(|name| !name.is_empty())
            .map(|name| schema.relation(name).map_err(ApiError::from))
            .collect()
    }

    /// Replace reference ids with the referenced records. Anything that
    /// cannot be resolved keeps its raw id.
    fn populate_row(&self, mut row: Value, relations: &[(&'static str, Table)]) -> Value {
        let Some(fields) = row.as_object_mut() else {
            return row;
        };

        for &(field, target) in relations {
            let id = match fields.get(field) {
                Some(Value::String(id)) => id.clone(),
                _ => continue,
            };
            let query = FindQuery {
                limit: Some(1),
                ..FindQuery::new(Filter::by_id(&id))
            };
            match self.store.find(target, &query) {
                Ok(found) => match found.into_iter().next() {
                    Some(doc) => {
                        fields.insert(field.to_string(), doc.to_public_json(target.schema()));
                    }
                    None => tracing::warn!(field, target = %target, id = %id, "Dangling reference"),
                },
                Err(e) => {
                    tracing::warn!(field, target = %target, error = %e, "Failed to populate reference")
                }
            }
        }
        row
    }
}
