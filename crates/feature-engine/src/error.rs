//! Feature Extraction Error Types

use crate::schema::SemanticType;
use tabular::{ColumnType, ModeError, TabularError};
use thiserror::Error;

/// Errors during feature extraction and assembly
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Mode other than `train` / `test`
    #[error("Invalid argument: {0}")]
    InvalidMode(#[from] ModeError),

    /// `transform` called before `fit`
    #[error("Feature assembler has not been fitted")]
    NotFitted,

    /// Query service failure, propagated unchanged
    #[error("Query failed: {0}")]
    Query(#[from] TabularError),

    /// Output column already produced elsewhere
    #[error("Column {column} of {aggregator} collides with an existing column")]
    ColumnConflict { aggregator: String, column: String },

    /// Sampled values disagree with the declared semantic type
    #[error("Column {column} of {aggregator} is declared {declared:?} but holds {observed:?} values")]
    SchemaMismatch {
        aggregator: String,
        column: String,
        declared: SemanticType,
        observed: ColumnType,
    },

    /// Fitted feature column absent from a transform result
    #[error("Fitted feature column {0} is missing from the assembled table")]
    SchemaDrift(String),
}
