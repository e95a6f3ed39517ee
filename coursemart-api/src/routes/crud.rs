//! Generic CRUD endpoints
//!
//! `{table}` is resolved against the table registry; anything unknown is a
//! 404 before any store is touched.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use coursemart_core::document::ID_FIELD;
use coursemart_core::Table;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{respond, ApiJson};
use crate::email::EmailSender;
use crate::error::{ApiError, ApiResult};
use crate::query::SearchRequest;
use crate::state::AppState;
use crate::store::{DocumentStore, OtpStore};

/// Query parameter naming relations to expand
const POPULATE_PARAM: &str = "populate";

#[derive(Deserialize)]
pub struct FindRequest {
    #[serde(default)]
    pub filter: Map<String, Value>,
    #[serde(default)]
    pub populate: Vec<String>,
}

#[derive(Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub filter: Map<String, Value>,
    pub update: Value,
}

#[derive(Deserialize)]
pub struct DeleteRequest {
    #[serde(default)]
    pub filter: Map<String, Value>,
}

#[derive(Deserialize)]
pub struct PopulateParams {
    #[serde(default)]
    pub populate: Option<String>,
}

fn resolve(name: &str) -> ApiResult<Table> {
    Ok(Table::resolve(name)?)
}

fn split_populate(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
        .unwrap_or_default()
}

fn id_condition(id: &str) -> Map<String, Value> {
    let mut cond = Map::new();
    cond.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    cond
}

/// POST /api/{table}
pub async fn create<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let record = state.query().create(table, body)?;
    respond(StatusCode::CREATED, "Created", record)
}

/// POST /api/{table}/bulk
pub async fn bulk_create<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(body): ApiJson<Value>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let records = state.query().bulk_create(table, body)?;
    respond(StatusCode::CREATED, "Created", records)
}

/// GET /api/{table}?field=value&populate=a,b
pub async fn list<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    Query(mut params): Query<HashMap<String, String>>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let populate = split_populate(params.remove(POPULATE_PARAM).as_deref());
    let cond: Map<String, Value> = params
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();

    let rows = state.query().find_many_populated(table, cond, &populate)?;
    respond(StatusCode::OK, "OK", rows)
}

/// POST /api/{table}/find
pub async fn find<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(req): ApiJson<FindRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let rows = state
        .query()
        .find_many_populated(table, req.filter, &req.populate)?;
    respond(StatusCode::OK, "OK", rows)
}

/// POST /api/{table}/find-one
pub async fn find_one<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(req): ApiJson<FindRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let row = state
        .query()
        .find_one_populated(table, req.filter, &req.populate)?
        .ok_or_else(|| ApiError::NotFound(format!("No matching {} record", table)))?;
    respond(StatusCode::OK, "OK", row)
}

/// POST /api/{table}/search
pub async fn search<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(req): ApiJson<SearchRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let page = state.query().search(table, req)?;
    respond(StatusCode::OK, "OK", page)
}

/// PATCH /api/{table}
pub async fn update_many<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let outcome = state.query().update(table, req.filter, req.update)?;
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound(format!("No matching {} record", table)));
    }
    respond(StatusCode::OK, "Updated", outcome)
}

/// DELETE /api/{table}
pub async fn delete_many<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path(table): Path<String>,
    ApiJson(req): ApiJson<DeleteRequest>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let deleted = state.query().delete(table, req.filter)?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("No matching {} record", table)));
    }
    respond(StatusCode::OK, "Deleted", json!({ "deletedCount": deleted }))
}

/// GET /api/{table}/{id}
pub async fn get_by_id<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path((table, id)): Path<(String, String)>,
    Query(params): Query<PopulateParams>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let populate = split_populate(params.populate.as_deref());
    let row = state
        .query()
        .find_one_populated(table, id_condition(&id), &populate)?
        .ok_or_else(|| ApiError::NotFound(format!("No {} record with id {}", table, id)))?;
    respond(StatusCode::OK, "OK", row)
}

/// PATCH /api/{table}/{id}
pub async fn update_by_id<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path((table, id)): Path<(String, String)>,
    ApiJson(patch): ApiJson<Value>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    let query = state.query();
    let outcome = query.update(table, id_condition(&id), patch)?;
    if outcome.matched_count == 0 {
        return Err(ApiError::NotFound(format!("No {} record with id {}", table, id)));
    }
    let row = query
        .find_one(table, id_condition(&id))?
        .ok_or_else(|| ApiError::NotFound(format!("No {} record with id {}", table, id)))?;
    respond(StatusCode::OK, "Updated", row)
}

/// DELETE /api/{table}/{id}
pub async fn delete_by_id<D, O, E>(
    State(state): State<Arc<AppState<D, O, E>>>,
    Path((table, id)): Path<(String, String)>,
) -> ApiResult<Response>
where
    D: DocumentStore,
    O: OtpStore,
    E: EmailSender,
{
    let table = resolve(&table)?;
    if state.query().delete(table, id_condition(&id))? == 0 {
        return Err(ApiError::NotFound(format!("No {} record with id {}", table, id)));
    }
    respond(StatusCode::OK, "Deleted", json!({ "deletedCount": 1 }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_populate() {
        assert_eq!(split_populate(Some("author, course")), vec!["author", "course"]);
        assert!(split_populate(None).is_empty());
    }
}
