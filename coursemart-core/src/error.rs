//! Error types for Coursemart core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("Unknown field `{field}` on table {table}")]
    UnknownField { table: &'static str, field: String },

    #[error("{0}")]
    Validation(String),

    #[error("Invalid id: {0}")]
    InvalidId(String),
}
