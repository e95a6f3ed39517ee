//! In-memory storage implementations

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use coursemart_core::{document, Document, Filter, FindQuery, Table, UpdateOutcome};
use serde_json::{Map, Value};

use super::{unique_conflict, DocumentStore, OtpRecord, OtpStore, StoreResult};
use crate::error::ApiError;

fn poisoned() -> ApiError {
    ApiError::Internal("store lock poisoned".to_string())
}

/// In-memory document store
pub struct InMemoryDocumentStore {
    tables: RwLock<HashMap<Table, Vec<Document>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<Table, Vec<Document>>>> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<Table, Vec<Document>>>> {
        self.tables.write().map_err(|_| poisoned())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn insert(&self, table: Table, docs: Vec<Document>) -> StoreResult<()> {
        let mut tables = self.write()?;
        let rows = tables.entry(table).or_default();

        if let Some(field) = table.schema().unique_violation(rows.iter().chain(docs.iter())) {
            return Err(unique_conflict(table, field));
        }
        if docs.iter().any(|d| rows.iter().any(|r| r.id == d.id)) {
            return Err(ApiError::Conflict("Duplicate document id".to_string()));
        }

        rows.extend(docs);
        Ok(())
    }

    fn find(&self, table: Table, query: &FindQuery) -> StoreResult<Vec<Document>> {
        let tables = self.read()?;
        Ok(tables
            .get(&table)
            .map(|rows| query.apply(rows))
            .unwrap_or_default())
    }

    fn count(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        let tables = self.read()?;
        let count = tables
            .get(&table)
            .map_or(0, |rows| rows.iter().filter(|d| filter.matches(d)).count());
        Ok(count as u64)
    }

    fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<UpdateOutcome> {
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(UpdateOutcome::default());
        };

        // Work on a copy so a unique violation leaves the table untouched
        let now = document::now();
        let mut updated = rows.clone();
        let mut outcome = UpdateOutcome::default();
        for doc in updated.iter_mut().filter(|d| filter.matches(d)) {
            outcome.matched_count += 1;
            if doc.apply_patch(patch, now) {
                outcome.modified_count += 1;
            }
        }

        if outcome.modified_count > 0 {
            if let Some(field) = table.schema().unique_violation(updated.iter()) {
                return Err(unique_conflict(table, field));
            }
            *rows = updated;
        }
        Ok(outcome)
    }

    fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(&table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|d| !filter.matches(d));
        Ok((before - rows.len()) as u64)
    }
}

/// In-memory OTP store
pub struct InMemoryOtpStore {
    records: RwLock<Vec<OtpRecord>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryOtpStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OtpStore for InMemoryOtpStore {
    fn store(
        &self,
        email: &str,
        purpose: &str,
        code: &str,
        payload: Value,
        ttl: chrono::Duration,
    ) -> StoreResult<()> {
        let record = OtpRecord::new(email, purpose, code, payload, ttl);
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.retain(|r| r.email != record.email || r.purpose != record.purpose || r.verified);
        records.push(record);
        Ok(())
    }

    fn verify(&self, email: &str, purpose: &str, code: &str) -> StoreResult<Option<Value>> {
        let email = email.to_lowercase();
        let now = Utc::now();
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records
            .iter_mut()
            .find(|r| r.email == email && r.accepts(purpose, code, now))
            .map(|r| {
                r.verified = true;
                r.payload.clone()
            }))
    }

    fn delete_all(&self, email: &str) -> StoreResult<u64> {
        let email = email.to_lowercase();
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let before = records.len();
        records.retain(|r| r.email != email);
        Ok((before - records.len()) as u64)
    }

    fn purge_expired(&self) -> StoreResult<u64> {
        let now = Utc::now();
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let before = records.len();
        records.retain(|r| !r.is_expired(now));
        Ok((before - records.len()) as u64)
    }
}
