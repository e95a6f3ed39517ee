//! Table schemas and input coercion
//!
//! Raw JSON from clients is never stored as-is. Inserts, patches and query
//! conditions all go through the owning table's schema, which drops unknown
//! keys, turns empty strings into `null`, coerces values to the declared field
//! kind and enforces required fields.

use std::collections::HashSet;

use serde_json::{Map, Number as JsonNumber, Value};

use crate::document::{
    format_timestamp, parse_timestamp, Document, DocumentId, CREATED_AT_FIELD, ID_FIELD,
    UPDATED_AT_FIELD,
};
use crate::query::{Condition, Sort, SortDirection, TextSearch};
use crate::table::Table;
use crate::{Error, Result};

/// Keys clients may send but that are never stored as fields
const RESERVED_KEYS: [&str; 5] = [ID_FIELD, "id", CREATED_AT_FIELD, UPDATED_AT_FIELD, "__v"];

/// Value kind of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Integer,
    Boolean,
    /// Id of a document in another table
    Reference(Table),
    Timestamp,
    List,
    /// Stored hashed, never returned to clients, not queryable
    Secret,
}

/// Declaration of one schema field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub unique: bool,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            unique: false,
        }
    }

    pub const fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    /// Coerce a raw value to this field's kind
    pub fn coerce(&self, value: Value) -> Result<Value> {
        let value = match value {
            Value::String(s) if s.is_empty() => return Ok(Value::Null),
            Value::Null => return Ok(Value::Null),
            other => other,
        };

        let invalid = |expected: &str| {
            Error::Validation(format!("Field `{}` must be {}", self.name, expected))
        };

        match self.kind {
            FieldKind::Text | FieldKind::Secret => match value {
                Value::String(_) => Ok(value),
                Value::Number(n) => Ok(Value::String(n.to_string())),
                Value::Bool(b) => Ok(Value::String(b.to_string())),
                _ => Err(invalid("a string")),
            },
            FieldKind::Number => match value {
                Value::Number(_) => Ok(value),
                Value::String(s) => parse_number(&s).ok_or_else(|| invalid("a number")),
                _ => Err(invalid("a number")),
            },
            FieldKind::Integer => {
                let parsed = match &value {
                    Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(whole_i64)),
                    Value::String(s) => s.trim().parse::<i64>().ok(),
                    _ => None,
                };
                parsed
                    .map(|i| Value::Number(i.into()))
                    .ok_or_else(|| invalid("an integer"))
            }
            FieldKind::Boolean => match value {
                Value::Bool(_) => Ok(value),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "1" => Ok(Value::Bool(true)),
                    "false" | "0" => Ok(Value::Bool(false)),
                    _ => Err(invalid("a boolean")),
                },
                _ => Err(invalid("a boolean")),
            },
            FieldKind::Reference(_) => match value {
                Value::String(s) => Ok(Value::String(DocumentId::parse(&s)?.to_string())),
                _ => Err(invalid("a document id")),
            },
            FieldKind::Timestamp => match value {
                Value::String(s) => parse_timestamp(&s)
                    .map(|ts| Value::String(format_timestamp(&ts)))
                    .ok_or_else(|| invalid("an RFC 3339 timestamp")),
                _ => Err(invalid("an RFC 3339 timestamp")),
            },
            FieldKind::List => match value {
                Value::Array(_) => Ok(value),
                scalar => Ok(Value::Array(vec![scalar])),
            },
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::Number(i.into()));
    }
    s.parse::<f64>()
        .ok()
        .and_then(JsonNumber::from_f64)
        .map(Value::Number)
}

/// Whole floats such as `3.0` or `1e3`, if they fit an i64
fn whole_i64(f: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as a float, hence the strict bound
    (f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64).then(|| f as i64)
}

/// Schema of one table
#[derive(Debug)]
pub struct TableSchema {
    pub table: Table,
    pub fields: &'static [FieldSpec],
    /// Fields searched when a text search names none
    pub search_fields: &'static [&'static str],
}

impl TableSchema {
    /// Look up a declared field
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of fields that must never leave the server
    pub fn secret_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.kind == FieldKind::Secret)
            .map(|f| f.name)
    }

    fn unknown_field(&self, field: &str) -> Error {
        Error::UnknownField {
            table: self.table.name(),
            field: field.to_string(),
        }
    }

    /// Turn a client payload into the field map of a new document.
    ///
    /// Unknown and reserved keys are dropped, values are coerced, and every
    /// required field must end up non-null.
    pub fn prepare_insert(&self, input: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (key, value) in input {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(spec) = self.field(&key) {
                out.insert(spec.name.to_string(), spec.coerce(value)?);
            }
        }

        for spec in self.fields.iter().filter(|f| f.required) {
            if out.get(spec.name).map_or(true, Value::is_null) {
                return Err(Error::Validation(format!("Field `{}` is required", spec.name)));
            }
        }

        Ok(out)
    }

    /// Turn a client patch into a field-set update.
    ///
    /// Unknown keys and timestamps are dropped; `_id` cannot be changed and
    /// required fields cannot be cleared.
    pub fn prepare_patch(&self, patch: Map<String, Value>) -> Result<Map<String, Value>> {
        let mut out = Map::new();
        for (key, value) in patch {
            if key == ID_FIELD || key == "id" {
                return Err(Error::Validation("Field `_id` cannot be modified".to_string()));
            }
            let Some(spec) = self.field(&key) else {
                continue;
            };
            let value = spec.coerce(value)?;
            if spec.required && value.is_null() {
                return Err(Error::Validation(format!("Field `{}` is required", spec.name)));
            }
            out.insert(spec.name.to_string(), value);
        }

        if out.is_empty() {
            return Err(Error::Validation(
                "Update contains no known fields".to_string(),
            ));
        }
        Ok(out)
    }

    /// Turn a client condition object into equality conditions.
    ///
    /// `id` is accepted as an alias of `_id`. Unlike inserts, unknown keys are
    /// rejected so a typo cannot silently widen a query.
    pub fn prepare_conditions(&self, cond: Map<String, Value>) -> Result<Vec<Condition>> {
        let mut out = Vec::with_capacity(cond.len());
        for (key, value) in cond {
            let condition = match key.as_str() {
                ID_FIELD | "id" => {
                    let id = match &value {
                        Value::String(s) => DocumentId::parse(s)?,
                        _ => return Err(Error::InvalidId(value.to_string())),
                    };
                    Condition::Equals {
                        field: ID_FIELD,
                        value: Value::String(id.to_string()),
                    }
                }
                CREATED_AT_FIELD | UPDATED_AT_FIELD => {
                    let field = if key == CREATED_AT_FIELD {
                        CREATED_AT_FIELD
                    } else {
                        UPDATED_AT_FIELD
                    };
                    let spec = FieldSpec::new(field, FieldKind::Timestamp);
                    Condition::Equals {
                        field,
                        value: spec.coerce(value)?,
                    }
                }
                _ => {
                    let spec = self.field(&key).ok_or_else(|| self.unknown_field(&key))?;
                    match spec.kind {
                        FieldKind::Secret => {
                            return Err(Error::Validation(format!(
                                "Field `{}` cannot be queried",
                                spec.name
                            )))
                        }
                        FieldKind::List => Condition::Contains {
                            field: spec.name,
                            value,
                        },
                        _ => Condition::Equals {
                            field: spec.name,
                            value: spec.coerce(value)?,
                        },
                    }
                }
            };
            out.push(condition);
        }
        Ok(out)
    }

    /// Build a text search over the given fields, or the table's default
    /// search fields when none are named. Blank terms yield no search.
    pub fn prepare_search(&self, term: &str, fields: &[String]) -> Result<Option<TextSearch>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(None);
        }

        let fields = if fields.is_empty() {
            self.search_fields.to_vec()
        } else {
            fields
                .iter()
                .map(|name| {
                    let spec = self.field(name).ok_or_else(|| self.unknown_field(name))?;
                    if spec.kind != FieldKind::Text {
                        return Err(Error::Validation(format!(
                            "Field `{}` is not searchable",
                            spec.name
                        )));
                    }
                    Ok(spec.name)
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Some(TextSearch {
            term: term.to_string(),
            fields,
        }))
    }

    /// Validate a sort field; `None` means newest first
    pub fn prepare_sort(&self, field: Option<&str>, direction: SortDirection) -> Result<Sort> {
        let field = match field {
            None => return Ok(Sort::default()),
            Some(ID_FIELD) | Some("id") => ID_FIELD,
            Some(CREATED_AT_FIELD) => CREATED_AT_FIELD,
            Some(UPDATED_AT_FIELD) => UPDATED_AT_FIELD,
            Some(name) => {
                let spec = self.field(name).ok_or_else(|| self.unknown_field(name))?;
                if spec.kind == FieldKind::Secret {
                    return Err(Error::Validation(format!(
                        "Field `{}` cannot be sorted on",
                        spec.name
                    )));
                }
                spec.name
            }
        };
        Ok(Sort { field, direction })
    }

    /// Resolve a relation name to its field and target table
    pub fn relation(&self, name: &str) -> Result<(&'static str, Table)> {
        match self.field(name).map(|spec| (spec.name, spec.kind)) {
            Some((field, FieldKind::Reference(target))) => Ok((field, target)),
            Some(_) => Err(Error::Validation(format!(
                "Field `{}` is not a relation",
                name
            ))),
            None => Err(self.unknown_field(name)),
        }
    }

    /// First unique field whose non-null value repeats across `docs`
    pub fn unique_violation<'a>(
        &self,
        docs: impl IntoIterator<Item = &'a Document>,
    ) -> Option<&'static str> {
        let unique: Vec<&'static str> = self
            .fields
            .iter()
            .filter(|f| f.unique)
            .map(|f| f.name)
            .collect();
        if unique.is_empty() {
            return None;
        }

        let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); unique.len()];
        for doc in docs {
            for (i, field) in unique.iter().enumerate() {
                match doc.fields.get(*field) {
                    None | Some(Value::Null) => {}
                    Some(value) => {
                        if !seen[i].insert(value.to_string()) {
                            return Some(*field);
                        }
                    }
                }
            }
        }
        None
    }
}
