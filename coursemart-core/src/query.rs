//! Query model
//!
//! Storage backends receive queries in this form. Field names inside a query
//! are always `&'static str` taken from a schema, so backends may splice them
//! into their own query language without further escaping.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, CREATED_AT_FIELD, ID_FIELD};

/// A single match condition
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals value (`null` also matches a missing field)
    Equals { field: &'static str, value: Value },
    /// List field contains value
    Contains { field: &'static str, value: Value },
}

impl Condition {
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Condition::Equals { field, value } => match doc.get(field) {
                None => value.is_null(),
                Some(actual) => values_equal(&actual, value),
            },
            Condition::Contains { field, value } => match doc.get(field) {
                Some(Value::Array(items)) => items.iter().any(|item| values_equal(item, value)),
                _ => false,
            },
        }
    }
}

/// Case-insensitive substring search across several text fields
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub term: String,
    pub fields: Vec<&'static str>,
}

impl TextSearch {
    pub fn matches(&self, doc: &Document) -> bool {
        let needle = self.term.to_lowercase();
        self.fields.iter().any(|field| match doc.fields.get(*field) {
            Some(Value::String(s)) => s.to_lowercase().contains(&needle),
            _ => false,
        })
    }
}

/// Conditions (all must hold) plus an optional text search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    pub conditions: Vec<Condition>,
    pub search: Option<TextSearch>,
}

impl Filter {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self {
            conditions,
            search: None,
        }
    }

    /// Filter selecting one document by id
    pub fn by_id(id: &str) -> Self {
        Self::new(vec![Condition::Equals {
            field: ID_FIELD,
            value: Value::String(id.to_string()),
        }])
    }

    pub fn with_search(mut self, search: Option<TextSearch>) -> Self {
        self.search = search;
        self
    }

    /// True when the filter selects every document
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty() && self.search.is_none()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.conditions.iter().all(|c| c.matches(doc))
            && self.search.as_ref().map_or(true, |s| s.matches(doc))
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ASC", alias = "Asc", alias = "1")]
    Asc,
    #[default]
    #[serde(alias = "DESC", alias = "Desc", alias = "-1")]
    Desc,
}

/// Sort order. Ties are broken by `_id` ascending in every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sort {
    pub field: &'static str,
    pub direction: SortDirection,
}

impl Default for Sort {
    /// Newest first
    fn default() -> Self {
        Self {
            field: CREATED_AT_FIELD,
            direction: SortDirection::Desc,
        }
    }
}

impl Sort {
    /// Order two documents the way storage backends must
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let primary = compare_values(a.get(self.field).as_ref(), b.get(self.field).as_ref());
        let primary = match self.direction {
            SortDirection::Asc => primary,
            SortDirection::Desc => primary.reverse(),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

/// A complete read request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub sort: Sort,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Apply this query to an in-memory set of documents
    pub fn apply<'a>(&self, docs: impl IntoIterator<Item = &'a Document>) -> Vec<Document> {
        let mut matched: Vec<&Document> = docs
            .into_iter()
            .filter(|d| self.filter.matches(d))
            .collect();
        matched.sort_by(|a, b| self.sort.compare(a, b));

        let skip = usize::try_from(self.skip).unwrap_or(usize::MAX);
        let limit = self
            .limit
            .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
        matched.into_iter().skip(skip).take(limit).cloned().collect()
    }
}

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u64,
    pub page_size: u64,
}

impl PageRequest {
    pub fn skip(&self) -> u64 {
        self.page.saturating_mul(self.page_size)
    }
}

/// One page of results plus the total match count
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub count: u64,
}

/// Result of a multi-document update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
}

/// Equality with numbers compared by value, so `5` equals `5.0`
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Total order over JSON values: null, then booleans and numbers by numeric
/// value, then strings; arrays and objects compare by their JSON text.
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) | Some(Value::Number(_)) => 1,
            Some(_) => 2,
        }
    }

    fn numeric(v: &Value) -> f64 {
        match v {
            Value::Bool(b) => f64::from(u8::from(*b)),
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    fn text(v: &Value) -> String {
        match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    match (rank(a), rank(b)) {
        (ra, rb) if ra != rb => ra.cmp(&rb),
        (1, 1) => match (a, b) {
            (Some(x), Some(y)) => numeric(x)
                .partial_cmp(&numeric(y))
                .unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        (2, 2) => match (a, b) {
            (Some(x), Some(y)) => text(x).cmp(&text(y)),
            _ => Ordering::Equal,
        },
        _ => Ordering::Equal,
    }
}
