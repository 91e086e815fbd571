//! Tabular Query Layer
//!
//! Typed queries over the per-mode melt tables, column-typed result tables,
//! and the backends that execute them (PostgreSQL and in-memory).

mod memory;
mod postgres;
mod query;
mod service;
mod table;
mod value;

pub use memory::InMemoryService;
pub use postgres::{PgQueryService, PgSettings};
pub use query::{
    Join, JoinKind, JoinPredicate, Mode, ModeError, Query, SourceTable, SqlStatement, Trailing, MELT_ID,
};
pub use service::QueryService;
pub use table::{Column, Table};
pub use value::{ColumnType, Value};

use thiserror::Error;

/// Tabular errors
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Unknown table: {0}")]
    UnknownTable(String),
    #[error("Missing column: {0}")]
    MissingColumn(String),
    #[error("Unsupported column type {type_name} for column {column}")]
    UnsupportedType { column: String, type_name: String },
    #[error("Row width {actual} does not match header width {expected}")]
    RowWidth { expected: usize, actual: usize },
    #[error("Duplicate key {key} in joined table")]
    DuplicateKey { key: i64 },
    #[error("Row {index} out of range for table of {len} rows")]
    RowIndex { index: usize, len: usize },
    #[error("Column {column} has a non-integer key value: {value}")]
    InvalidKey { column: String, value: String },
}

impl From<sqlx::Error> for TabularError {
    fn from(err: sqlx::Error) -> Self {
        TabularError::DatabaseError(err.to_string())
    }
}
