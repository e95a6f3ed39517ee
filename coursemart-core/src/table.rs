//! Table registry
//!
//! The closed set of entity tables the generic CRUD layer can reach, and the
//! name normalization that maps loosely spelled route segments onto them.

use std::fmt;
use std::str::FromStr;

use crate::schema::FieldKind::{
    Boolean, Integer, List, Number, Reference, Secret, Text, Timestamp,
};
use crate::schema::{FieldSpec, TableSchema};
use crate::{Error, Result};

/// A persisted entity type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Users,
    Courses,
    Payments,
    News,
    Portfolios,
    Jobs,
    Products,
}

impl Table {
    /// Every registered table
    pub const ALL: [Table; 7] = [
        Table::Users,
        Table::Courses,
        Table::Payments,
        Table::News,
        Table::Portfolios,
        Table::Jobs,
        Table::Products,
    ];

    /// Canonical name, used in storage and in messages
    pub fn name(self) -> &'static str {
        match self {
            Table::Users => "users",
            Table::Courses => "courses",
            Table::Payments => "payments",
            Table::News => "news",
            Table::Portfolios => "portfolios",
            Table::Jobs => "jobs",
            Table::Products => "products",
        }
    }

    /// Resolve a user-supplied table name.
    ///
    /// Case, surrounding whitespace and separators (`-`, `_`, spaces) are
    /// ignored, and singular/plural spellings are both accepted.
    pub fn resolve(input: &str) -> Result<Table> {
        let key: String = input
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        let table = match key.as_str() {
            "user" | "users" => Table::Users,
            "course" | "courses" => Table::Courses,
            "payment" | "payments" => Table::Payments,
            "news" | "blog" | "blogs" => Table::News,
            "portfolio" | "portfolios" => Table::Portfolios,
            "job" | "jobs" | "jobposting" | "jobpostings" => Table::Jobs,
            "product" | "products" => Table::Products,
            _ => return Err(Error::UnknownTable(input.to_string())),
        };
        Ok(table)
    }

    /// Static schema for this table
    pub fn schema(self) -> &'static TableSchema {
        match self {
            Table::Users => &USERS,
            Table::Courses => &COURSES,
            Table::Payments => &PAYMENTS,
            Table::News => &NEWS,
            Table::Portfolios => &PORTFOLIOS,
            Table::Jobs => &JOBS,
            Table::Products => &PRODUCTS,
        }
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Table::resolve(s)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

static USERS: TableSchema = TableSchema {
    table: Table::Users,
    fields: &[
        FieldSpec::new("name", Text).required(),
        FieldSpec::new("email", Text).required().unique(),
        FieldSpec::new("password", Secret).required(),
        FieldSpec::new("role", Text),
        FieldSpec::new("phone", Text),
        FieldSpec::new("avatar", Text),
        FieldSpec::new("telegramId", Integer),
    ],
    search_fields: &["name", "email"],
};

static COURSES: TableSchema = TableSchema {
    table: Table::Courses,
    fields: &[
        FieldSpec::new("title", Text).required(),
        FieldSpec::new("slug", Text).unique(),
        FieldSpec::new("description", Text),
        FieldSpec::new("category", Text),
        FieldSpec::new("level", Text),
        FieldSpec::new("price", Number),
        FieldSpec::new("instructor", Reference(Table::Users)),
        FieldSpec::new("thumbnail", Text),
        FieldSpec::new("telegramFileId", Text),
        FieldSpec::new("published", Boolean),
        FieldSpec::new("tags", List),
    ],
    search_fields: &["title", "description", "category"],
};

static PAYMENTS: TableSchema = TableSchema {
    table: Table::Payments,
    fields: &[
        FieldSpec::new("user", Reference(Table::Users)).required(),
        FieldSpec::new("course", Reference(Table::Courses)).required(),
        FieldSpec::new("amount", Number).required(),
        FieldSpec::new("currency", Text),
        FieldSpec::new("status", Text),
        FieldSpec::new("orderId", Text).unique(),
        FieldSpec::new("paymentId", Text).unique(),
    ],
    search_fields: &["orderId", "paymentId", "status"],
};

static NEWS: TableSchema = TableSchema {
    table: Table::News,
    fields: &[
        FieldSpec::new("title", Text).required(),
        FieldSpec::new("content", Text),
        FieldSpec::new("image", Text),
        FieldSpec::new("author", Reference(Table::Users)),
        FieldSpec::new("tags", List),
        FieldSpec::new("published", Boolean),
    ],
    search_fields: &["title", "content"],
};

static PORTFOLIOS: TableSchema = TableSchema {
    table: Table::Portfolios,
    fields: &[
        FieldSpec::new("title", Text).required(),
        FieldSpec::new("owner", Reference(Table::Users)),
        FieldSpec::new("description", Text),
        FieldSpec::new("link", Text),
        FieldSpec::new("images", List),
    ],
    search_fields: &["title", "description"],
};

static JOBS: TableSchema = TableSchema {
    table: Table::Jobs,
    fields: &[
        FieldSpec::new("title", Text).required(),
        FieldSpec::new("company", Text).required(),
        FieldSpec::new("location", Text),
        FieldSpec::new("employmentType", Text),
        FieldSpec::new("description", Text),
        FieldSpec::new("applyLink", Text),
        FieldSpec::new("salary", Number),
        FieldSpec::new("deadline", Timestamp),
    ],
    search_fields: &["title", "company", "location"],
};

static PRODUCTS: TableSchema = TableSchema {
    table: Table::Products,
    fields: &[
        FieldSpec::new("title", Text).required(),
        FieldSpec::new("price", Integer).required(),
        FieldSpec::new("description", Text),
        FieldSpec::new("category", Text),
        FieldSpec::new("mediaType", Text),
        FieldSpec::new("mediaUrl", Text),
        FieldSpec::new("telegramFileId", Text),
        FieldSpec::new("stock", Integer),
        FieldSpec::new("sellerTelegramId", Integer),
    ],
    search_fields: &["title", "description", "category"],
};
