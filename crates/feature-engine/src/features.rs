//! Flat Feature Table

use serde::{Deserialize, Serialize};
use tabular::{Mode, Table, TabularError, MELT_ID};

/// Target columns carried from the target relation
pub const TARGET_COLUMNS: [&str; 2] = ["TST", "C"];

/// Assembled per-melt feature table
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Melt ID, targets, then every aggregator's columns
    table: Table,
    /// Model input columns fixed at fit time
    feature_columns: Vec<String>,
    /// Subset of `feature_columns` to treat as categories
    categorical: Vec<String>,
    /// Mode the table was assembled for
    mode: Mode,
}

/// Shape summary for logs and reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTableInfo {
    pub mode: Mode,
    pub melts: usize,
    pub columns: usize,
    pub features: usize,
    pub categorical: usize,
}

impl FeatureTable {
    pub fn new(table: Table, feature_columns: Vec<String>, categorical: Vec<String>, mode: Mode) -> Self {
        Self {
            table,
            feature_columns,
            categorical,
            mode,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn categorical(&self) -> &[String] {
        &self.categorical
    }

    /// Number of melts
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Melt IDs in row order
    pub fn melt_ids(&self) -> Result<Vec<i64>, TabularError> {
        self.table.keys(MELT_ID)
    }

    /// Model inputs only
    pub fn features(&self) -> Result<Table, TabularError> {
        let names: Vec<&str> = self.feature_columns.iter().map(String::as_str).collect();
        self.table.select(&names)
    }

    /// Melt ID and both targets
    pub fn targets(&self) -> Result<Table, TabularError> {
        self.table.select(&[MELT_ID, TARGET_COLUMNS[0], TARGET_COLUMNS[1]])
    }

    pub fn info(&self) -> FeatureTableInfo {
        FeatureTableInfo {
            mode: self.mode,
            melts: self.table.len(),
            columns: self.table.columns().len(),
            features: self.feature_columns.len(),
            categorical: self.categorical.len(),
        }
    }
}
