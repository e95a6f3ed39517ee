//! Stored documents
//!
//! A document is a schema-checked JSON object plus the three fields every
//! table carries: `_id`, `createdAt` and `updatedAt`.

use std::fmt;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::schema::TableSchema;
use crate::{Error, Result};

/// Primary key field name
pub const ID_FIELD: &str = "_id";
/// Creation timestamp field name
pub const CREATED_AT_FIELD: &str = "createdAt";
/// Last-modification timestamp field name
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Unique document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    /// Generate a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an id from its string form
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| Error::InvalidId(s.to_string()))
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Format a timestamp with fixed microsecond precision.
///
/// Every stored timestamp goes through here so that string order equals
/// time order, which the SQLite backend relies on for sorting.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time at the precision timestamps are stored with
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}

/// A stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: DocumentId,

    #[serde(rename = "createdAt", with = "timestamp")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", with = "timestamp")]
    pub updated_at: DateTime<Utc>,

    /// Schema fields, already coerced
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create a document with a fresh id, stamped now
    pub fn new(fields: Map<String, Value>) -> Self {
        let now = now();
        Self {
            id: DocumentId::new(),
            created_at: now,
            updated_at: now,
            fields,
        }
    }

    /// Read a field, including the reserved ones, as JSON
    pub fn get(&self, field: &str) -> Option<Value> {
        match field {
            ID_FIELD => Some(Value::String(self.id.to_string())),
            CREATED_AT_FIELD => Some(Value::String(format_timestamp(&self.created_at))),
            UPDATED_AT_FIELD => Some(Value::String(format_timestamp(&self.updated_at))),
            _ => self.fields.get(field).cloned(),
        }
    }

    /// Set every field in `patch`. Returns whether anything changed;
    /// `updatedAt` only moves when it did.
    pub fn apply_patch(&mut self, patch: &Map<String, Value>, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        for (key, value) in patch {
            if self.fields.get(key) != Some(value) {
                self.fields.insert(key.clone(), value.clone());
                changed = true;
            }
        }
        if changed {
            self.updated_at = now;
        }
        changed
    }

    /// Full JSON view, secret fields included
    pub fn to_json(&self) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert(ID_FIELD.to_string(), Value::String(self.id.to_string()));
        out.insert(
            CREATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.created_at)),
        );
        out.insert(
            UPDATED_AT_FIELD.to_string(),
            Value::String(format_timestamp(&self.updated_at)),
        );
        for (key, value) in &self.fields {
            out.insert(key.clone(), value.clone());
        }
        out
    }

    /// JSON view safe to hand to clients: secret fields are removed
    pub fn to_public_json(&self, schema: &TableSchema) -> Value {
        let mut out = self.to_json();
        for field in schema.secret_fields() {
            out.remove(field);
        }
        Value::Object(out)
    }

    /// Rebuild a document from its persisted JSON form
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::Validation(format!("Corrupt document: {}", e)))
    }
}
