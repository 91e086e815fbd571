//! Declared Feature Schemas
//!
//! Every aggregator declares its output columns up front. Type inference on
//! the fit sample only validates the declaration.

use crate::error::FeatureError;
use serde::{Deserialize, Serialize};
use tabular::{ColumnType, Table};

/// Semantic type of an output column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SemanticType {
    Categorical,
    Integer,
    Float,
    /// Timestamps; carried in the table but never used as features
    Temporal,
}

impl SemanticType {
    /// Physical column type of an aggregator's output
    pub fn column_type(&self) -> ColumnType {
        match self {
            SemanticType::Categorical => ColumnType::Text,
            SemanticType::Integer => ColumnType::Integer,
            SemanticType::Float => ColumnType::Float,
            SemanticType::Temporal => ColumnType::Timestamp,
        }
    }

    /// Whether an observed cell type is consistent with this declaration
    pub fn admits(&self, observed: ColumnType) -> bool {
        match self {
            SemanticType::Categorical => {
                matches!(observed, ColumnType::Text | ColumnType::Categorical)
            }
            SemanticType::Integer => observed == ColumnType::Integer,
            SemanticType::Float => matches!(observed, ColumnType::Float | ColumnType::Integer),
            SemanticType::Temporal => observed == ColumnType::Timestamp,
        }
    }
}

/// Declared output column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub ty: SemanticType,
}

impl FeatureColumn {
    pub fn new(name: impl Into<String>, ty: SemanticType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Column sets of one aggregator, split by semantic type
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatorSchema {
    pub aggregator: String,
    pub categorical: Vec<String>,
    pub integer: Vec<String>,
    pub float: Vec<String>,
    pub temporal: Vec<String>,
}

impl AggregatorSchema {
    /// Split a declared schema into disjoint sets
    pub fn from_declared(aggregator: &str, declared: &[FeatureColumn]) -> Self {
        let mut schema = Self {
            aggregator: aggregator.to_string(),
            ..Default::default()
        };
        for col in declared {
            let set = match col.ty {
                SemanticType::Categorical => &mut schema.categorical,
                SemanticType::Integer => &mut schema.integer,
                SemanticType::Float => &mut schema.float,
                SemanticType::Temporal => &mut schema.temporal,
            };
            set.push(col.name.clone());
        }
        schema
    }
}

/// Schema established by `fit`, fixed for every later transform
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedSchema {
    pub aggregators: Vec<AggregatorSchema>,
    /// Model input columns: floats, then integers, then categoricals
    pub feature_columns: Vec<String>,
    pub categorical: Vec<String>,
}

impl FittedSchema {
    pub fn new(aggregators: Vec<AggregatorSchema>) -> Self {
        let float = aggregators.iter().flat_map(|a| a.float.iter().cloned());
        let integer = aggregators.iter().flat_map(|a| a.integer.iter().cloned());
        let categorical: Vec<String> = aggregators
            .iter()
            .flat_map(|a| a.categorical.iter().cloned())
            .collect();
        let feature_columns = float
            .chain(integer)
            .chain(categorical.iter().cloned())
            .collect();
        Self {
            aggregators,
            feature_columns,
            categorical,
        }
    }
}

/// Check a sampled aggregator output against its declaration
pub fn validate(
    aggregator: &str,
    declared: &[FeatureColumn],
    sample: &Table,
) -> Result<(), FeatureError> {
    for col in declared {
        if let Some(observed) = sample.observed_type(&col.name)? {
            if !col.ty.admits(observed) {
                return Err(FeatureError::SchemaMismatch {
                    aggregator: aggregator.to_string(),
                    column: col.name.clone(),
                    declared: col.ty,
                    observed,
                });
            }
        }
    }
    Ok(())
}
