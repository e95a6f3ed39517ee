//! SQLite-based storage implementation
//!
//! Every table lives in one `documents` relation keyed by `(tbl, id)`, with
//! the document serialized to JSON in `body`. Conditions, search and sort are
//! translated to `json_extract` expressions, and unique fields are enforced by
//! partial expression indexes.

use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use coursemart_core::document::{format_timestamp, CREATED_AT_FIELD, ID_FIELD};
use coursemart_core::{
    document, Condition, Document, Filter, FindQuery, SortDirection, Table, TextSearch,
    UpdateOutcome,
};
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::{unique_conflict, DocumentStore, OtpRecord, OtpStore, StoreResult};
use crate::error::ApiError;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// SQL function lowercasing text the way `str::to_lowercase` does.
/// SQLite's own LOWER only folds ASCII.
const LOWER_FN: &str = "unicode_lower";

/// SQLite-based store implementing both DocumentStore and OtpStore
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: &str) -> Result<Self, ApiError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, ApiError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, ApiError> {
        Self::register_functions(&conn)?;
        Self::migrate(&conn)?;
        Self::ensure_unique_indexes(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| ApiError::Internal("database lock poisoned".to_string()))
    }

    fn register_functions(conn: &Connection) -> Result<(), ApiError> {
        conn.create_scalar_function(
            LOWER_FN,
            1,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                // Only text is searchable; numbers and NULL never match
                Ok(match ctx.get_raw(0) {
                    ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).to_lowercase()),
                    _ => None,
                })
            },
        )?;
        Ok(())
    }

    /// Run database migrations
    fn migrate(conn: &Connection) -> Result<(), ApiError> {
        let current_version = Self::get_schema_version(conn)?;

        if current_version < SCHEMA_VERSION {
            tracing::info!(
                current = current_version,
                target = SCHEMA_VERSION,
                "Running database migrations"
            );

            if current_version < 1 {
                Self::migrate_v1(conn)?;
            }
            if current_version < 2 {
                Self::migrate_v2(conn)?;
            }

            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;

            tracing::info!("Database migrations complete");
        }

        Ok(())
    }

    /// Get current schema version (0 if no schema exists)
    fn get_schema_version(conn: &Connection) -> Result<i32, ApiError> {
        let table_exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        Ok(conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0).map(|v| v.unwrap_or(0))
        })?)
    }

    /// Migration to version 1: initial schema
    fn migrate_v1(conn: &Connection) -> Result<(), ApiError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- All entity tables, one JSON body per row
            CREATE TABLE IF NOT EXISTS documents (
                tbl TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (tbl, id)
            );
            CREATE INDEX IF NOT EXISTS idx_documents_created ON documents(tbl, created_at);

            CREATE TABLE IF NOT EXISTS otps (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                code TEXT NOT NULL,
                payload TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                verified INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_otps_email ON otps(email);
            CREATE INDEX IF NOT EXISTS idx_otps_expires ON otps(expires_at);
            "#,
        )?;

        Ok(())
    }

    /// Migration to version 2: codes are bound to the flow that issued them
    fn migrate_v2(conn: &Connection) -> Result<(), ApiError> {
        conn.execute_batch(
            r#"
            ALTER TABLE otps ADD COLUMN purpose TEXT NOT NULL DEFAULT '';
            "#,
        )?;

        Ok(())
    }

    /// One partial unique index per unique schema field. Kept outside the
    /// versioned migrations so schema additions pick up their index on open.
    fn ensure_unique_indexes(conn: &Connection) -> Result<(), ApiError> {
        for table in Table::ALL {
            for field in table.schema().fields.iter().filter(|f| f.unique) {
                conn.execute_batch(&format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {index} \
                     ON documents(json_extract(body, '$.{field}')) WHERE tbl = '{table}';",
                    index = index_name(table, field.name),
                    field = field.name,
                    table = table.name(),
                ))?;
            }
        }
        Ok(())
    }

    fn parse_rows(bodies: Vec<String>) -> StoreResult<Vec<Document>> {
        bodies
            .iter()
            .map(|body| Document::from_json(body).map_err(|e| ApiError::Internal(e.to_string())))
            .collect()
    }
}

fn index_name(table: Table, field: &str) -> String {
    format!("uq_{}_{}", table.name(), field)
}

/// Map a write error, naming the violated unique field when there is one
fn write_error(table: Table, err: rusqlite::Error) -> ApiError {
    if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
        if e.code == rusqlite::ErrorCode::ConstraintViolation {
            let prefix = index_name(table, "");
            if let Some(field) = table
                .schema()
                .fields
                .iter()
                .find(|f| f.unique && msg.contains(&format!("{}{}", prefix, f.name)))
            {
                return unique_conflict(table, field.name);
            }
        }
    }
    ApiError::from(err)
}

/// Column expression for a document field
fn column(field: &str) -> String {
    match field {
        ID_FIELD => "id".to_string(),
        CREATED_AT_FIELD => "created_at".to_string(),
        _ => format!("json_extract(body, '$.{}')", field),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// WHERE clause plus its bound parameters
struct SqlFilter {
    clause: String,
    params: Vec<SqlValue>,
}

impl SqlFilter {
    fn new(table: Table, filter: &Filter) -> Self {
        let mut clause = String::from("tbl = ?");
        let mut params = vec![SqlValue::Text(table.name().to_string())];

        for condition in &filter.conditions {
            match condition {
                Condition::Equals { field, value } if value.is_null() => {
                    clause.push_str(&format!(" AND {} IS NULL", column(field)));
                }
                Condition::Equals { field, value } => {
                    clause.push_str(&format!(" AND {} = ?", column(field)));
                    params.push(to_sql(value));
                }
                Condition::Contains { field, value } => {
                    clause.push_str(&format!(
                        " AND EXISTS (SELECT 1 FROM json_each(documents.body, '$.{}') \
                         WHERE json_each.value = ?)",
                        field
                    ));
                    params.push(to_sql(value));
                }
            }
        }

        if let Some(TextSearch { term, fields }) = &filter.search {
            let needle = term.to_lowercase();
            let parts: Vec<String> = fields
                .iter()
                .map(|f| format!("instr({}({}), ?) > 0", LOWER_FN, column(f)))
                .collect();
            if parts.is_empty() {
                clause.push_str(" AND 0");
            } else {
                clause.push_str(&format!(" AND ({})", parts.join(" OR ")));
                params.extend(fields.iter().map(|_| SqlValue::Text(needle.clone())));
            }
        }

        Self { clause, params }
    }
}

impl DocumentStore for SqliteStore {
    fn insert(&self, table: Table, docs: Vec<Document>) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for doc in &docs {
            let body = serde_json::to_string(doc)?;
            tx.execute(
                "INSERT INTO documents (tbl, id, body, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    table.name(),
                    doc.id.to_string(),
                    body,
                    format_timestamp(&doc.created_at)
                ],
            )
            .map_err(|e| write_error(table, e))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn find(&self, table: Table, query: &FindQuery) -> StoreResult<Vec<Document>> {
        let conn = self.lock()?;
        let filter = SqlFilter::new(table, &query.filter);
        let direction = match query.sort.direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        let sql = format!(
            "SELECT body FROM documents WHERE {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            filter.clause,
            column(query.sort.field),
            direction
        );

        let mut params = filter.params;
        params.push(SqlValue::Integer(
            query.limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX)),
        ));
        params.push(SqlValue::Integer(
            i64::try_from(query.skip).unwrap_or(i64::MAX),
        ));

        let mut stmt = conn.prepare(&sql)?;
        let bodies = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Self::parse_rows(bodies)
    }

    fn count(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        let conn = self.lock()?;
        let filter = SqlFilter::new(table, filter);
        let sql = format!("SELECT COUNT(*) FROM documents WHERE {}", filter.clause);
        let count: i64 =
            conn.query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))?;
        Ok(count as u64)
    }

    fn update(
        &self,
        table: Table,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StoreResult<UpdateOutcome> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let filter = SqlFilter::new(table, filter);
        let bodies = {
            let mut stmt =
                tx.prepare(&format!("SELECT body FROM documents WHERE {}", filter.clause))?;
            let rows = stmt
                .query_map(params_from_iter(filter.params.iter()), |row| {
                    row.get::<_, String>(0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let now = document::now();
        let mut outcome = UpdateOutcome::default();
        for mut doc in Self::parse_rows(bodies)? {
            outcome.matched_count += 1;
            if !doc.apply_patch(patch, now) {
                continue;
            }
            outcome.modified_count += 1;
            tx.execute(
                "UPDATE documents SET body = ?1 WHERE tbl = ?2 AND id = ?3",
                params![serde_json::to_string(&doc)?, table.name(), doc.id.to_string()],
            )
            .map_err(|e| write_error(table, e))?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn delete(&self, table: Table, filter: &Filter) -> StoreResult<u64> {
        let conn = self.lock()?;
        let filter = SqlFilter::new(table, filter);
        let deleted = conn.execute(
            &format!("DELETE FROM documents WHERE {}", filter.clause),
            params_from_iter(filter.params.iter()),
        )?;
        Ok(deleted as u64)
    }
}

impl OtpStore for SqliteStore {
    fn store(
        &self,
        email: &str,
        purpose: &str,
        code: &str,
        payload: Value,
        ttl: chrono::Duration,
    ) -> StoreResult<()> {
        let record = OtpRecord::new(email, purpose, code, payload, ttl);
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM otps WHERE email = ?1 AND purpose = ?2 AND verified = 0",
            params![record.email, record.purpose],
        )?;
        tx.execute(
            "INSERT INTO otps (id, email, purpose, code, payload, expires_at, verified, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
            params![
                record.id.to_string(),
                record.email,
                record.purpose,
                record.code,
                serde_json::to_string(&record.payload)?,
                format_timestamp(&record.expires_at),
                format_timestamp(&record.created_at),
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn verify(&self, email: &str, purpose: &str, code: &str) -> StoreResult<Option<Value>> {
        let email = email.to_lowercase();
        let now = format_timestamp(&Utc::now());
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let found: Option<(String, String)> = tx
            .query_row(
                "SELECT id, payload FROM otps
                 WHERE email = ?1 AND purpose = ?2 AND code = ?3
                   AND verified = 0 AND expires_at > ?4
                 ORDER BY created_at DESC LIMIT 1",
                params![email, purpose, code, now],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, payload)) = found else {
            return Ok(None);
        };

        tx.execute("UPDATE otps SET verified = 1 WHERE id = ?1", params![id])?;
        tx.commit()?;

        Ok(Some(serde_json::from_str(&payload)?))
    }

    fn delete_all(&self, email: &str) -> StoreResult<u64> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM otps WHERE email = ?1",
            params![email.to_lowercase()],
        )?;
        Ok(deleted as u64)
    }

    fn purge_expired(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let now = format_timestamp(&Utc::now());
        let deleted = conn.execute("DELETE FROM otps WHERE expires_at <= ?1", params![now])?;
        Ok(deleted as u64)
    }
}
