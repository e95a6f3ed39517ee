//! Coursemart Core Library
//!
//! Domain model for the Coursemart backend:
//! - A closed registry of entity tables, each with a static schema
//! - Documents and the coercion rules that turn raw JSON into them
//! - A small query model (conditions, text search, sort, pagination)
//! - The Telegram upload conversation state machine
//! - A regex-based résumé parser

pub mod bot;
pub mod document;
pub mod error;
pub mod query;
pub mod resume;
pub mod schema;
pub mod table;

pub use bot::{CompletedProduct, Input, MediaKind, ProductDraft, Step, UploadSession, UploadState};
pub use document::{Document, DocumentId};
pub use error::Error;
pub use query::{
    Condition, Filter, FindQuery, Page, PageRequest, Sort, SortDirection, TextSearch,
    UpdateOutcome,
};
pub use resume::{parse_resume, ResumeProfile};
pub use schema::{FieldKind, FieldSpec, TableSchema};
pub use table::Table;

/// Result type for coursemart-core operations
pub type Result<T> = std::result::Result<T, Error>;
