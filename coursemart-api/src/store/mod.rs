//! Storage abstractions for the service

pub mod memory;
pub mod models;
pub mod sqlite;

use std::sync::Arc;

use coursemart_core::{Document, Filter, FindQuery, Table, UpdateOutcome};
use serde_json::{Map, Value};

pub use memory::{InMemoryDocumentStore, InMemoryOtpStore};
pub use models::*;
pub use sqlite::SqliteStore;

use crate::error::ApiError;

/// Result type for store operations
pub type StoreResult<T> = Result<T, ApiError>;

/// Trait for document storage, one collection per table.
///
/// Implementations enforce the table's unique fields and report a violation
/// as [`ApiError::Conflict`] without changing anything.
pub trait DocumentStore: Send + Sync {
    /// Insert documents, all or none
    fn insert(&self, table: Table, docs: Vec<Document>) -> StoreResult<()>;

    /// Find documents matching the query, sorted and paginated
    fn find(&self, table: Table, query: &FindQuery) -> StoreResult<Vec<Document>>;

    /// Count documents matching the filter
    fn count(&self, table: Table, filter: &Filter) -> StoreResult<u64>;

    /// Set the given fields on every matching document
    fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<UpdateOutcome>;

    /// Delete every matching document, returning how many were removed
    fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64>;
}

/// Trait for one-time password storage
pub trait OtpStore: Send + Sync {
    /// Store a fresh code for `email`, replacing any unverified ones
    /// issued for the same purpose
    fn store(
        &self,
        email: &str,
        purpose: &str,
        code: &str,
        payload: Value,
        ttl: chrono::Duration,
    ) -> StoreResult<()>;

    /// Consume a live code issued for `purpose`, returning its payload on
    /// success. Codes issued for another purpose are left untouched.
    fn verify(&self, email: &str, purpose: &str, code: &str) -> StoreResult<Option<Value>>;

    /// Delete every code for `email`
    fn delete_all(&self, email: &str) -> StoreResult<u64>;

    /// Delete every expired code
    fn purge_expired(&self) -> StoreResult<u64>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Arc<T> {
    fn insert(&self, table: Table, docs: Vec<Document>) -> StoreResult<()> {
        (**self).insert(table, docs)
    }

    fn find(&self, table: Table, query: &FindQuery) -> StoreResult<Vec<Document>> {
        (**self).find(table, query)
    }

    fn count(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        (**self).count(table, filter)
    }

    fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<UpdateOutcome> {
        (**self).update(table, filter, patch)
    }

    fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        (**self).delete(table, filter)
    }
}

impl<T: OtpStore + ?Sized> OtpStore for Arc<T> {
    fn store(
        &self,
        email: &str,
        purpose: &str,
        code: &str,
        payload: Value,
        ttl: chrono::Duration,
    ) -> StoreResult<()> {
        (**self).store(email, purpose, code, payload, ttl)
    }

    fn verify(&self, email: &str, purpose: &str, code: &str) -> StoreResult<Option<Value>> {
        (**self).verify(email, purpose, code)
    }

    fn delete_all(&self, email: &str) -> StoreResult<u64> {
        (**self).delete_all(email)
    }

    fn purge_expired(&self) -> StoreResult<u64> {
        (**self).purge_expired()
    }
}

/// Conflict error naming the violated unique field
pub(crate) fn unique_conflict(table: Table, field: &str) -> ApiError {
    ApiError::Conflict(format!("A {} record with this `{}` already exists", table, field))
}
