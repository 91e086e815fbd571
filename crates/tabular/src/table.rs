//! Column-Typed Result Table

use crate::value::{ColumnType, Value};
use crate::TabularError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Column header entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Row-major table with a typed header
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given header
    pub fn new(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Create an empty table from `(name, type)` pairs
    pub fn with_columns(columns: &[(&str, ColumnType)]) -> Self {
        Self::new(
            columns
                .iter()
                .map(|(name, ty)| Column::new(*name, *ty))
                .collect(),
        )
    }

    /// Append a row; its width must match the header
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), TabularError> {
        if row.len() != self.columns.len() {
            return Err(TabularError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Position of a column in the header
    pub fn index_of(&self, name: &str) -> Result<usize, TabularError> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| TabularError::MissingColumn(name.to_string()))
    }

    /// Declared type of a column
    pub fn column_type(&self, name: &str) -> Result<ColumnType, TabularError> {
        Ok(self.columns[self.index_of(name)?].ty)
    }

    /// Redeclare a column's type without touching its cells
    pub fn set_column_type(&mut self, name: &str, ty: ColumnType) -> Result<(), TabularError> {
        let idx = self.index_of(name)?;
        self.columns[idx].ty = ty;
        Ok(())
    }

    /// All cells of one column, top to bottom
    pub fn column_values(&self, name: &str) -> Result<Vec<&Value>, TabularError> {
        let idx = self.index_of(name)?;
        Ok(self.rows.iter().map(|r| &r[idx]).collect())
    }

    /// Integer key of a row
    pub fn key_at(&self, row: usize, key_idx: usize) -> Result<i64, TabularError> {
        let value = &self.rows[row][key_idx];
        value.as_i64().ok_or_else(|| TabularError::InvalidKey {
            column: self.columns[key_idx].name.clone(),
            value: format!("{:?}", value),
        })
    }

    /// Keys of every row of an integer key column
    pub fn keys(&self, key: &str) -> Result<Vec<i64>, TabularError> {
        let idx = self.index_of(key)?;
        (0..self.rows.len()).map(|r| self.key_at(r, idx)).collect()
    }

    /// Keep only rows for which the predicate holds
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    /// Copy of the given rows, in the given order
    pub fn subset(&self, rows: &[usize]) -> Result<Table, TabularError> {
        let picked = rows
            .iter()
            .map(|&r| {
                self.rows.get(r).cloned().ok_or(TabularError::RowIndex {
                    index: r,
                    len: self.rows.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table {
            columns: self.columns.clone(),
            rows: picked,
        })
    }

    /// Stable sort by an integer key column
    pub fn sort_by_key(&mut self, key: &str) -> Result<(), TabularError> {
        let idx = self.index_of(key)?;
        for r in 0..self.rows.len() {
            self.key_at(r, idx)?;
        }
        self.rows
            .sort_by_key(|row| row[idx].as_i64().unwrap_or(i64::MIN));
        Ok(())
    }

    /// Stable sort of whole rows, column by column, nulls last
    pub fn sort_rows(&mut self) {
        self.rows.sort_by(|a, b| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        });
    }

    /// Project onto the named columns, in the given order
    pub fn select(&self, names: &[&str]) -> Result<Table, TabularError> {
        let indices = names
            .iter()
            .map(|n| self.index_of(n))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Table {
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Left-join `other` onto this table by an integer key column.
    ///
    /// Every row of `self` is kept in order; rows without a match get nulls.
    /// `other` must hold at most one row per key.
    pub fn left_join(&mut self, other: &Table, key: &str) -> Result<(), TabularError> {
        let left_key = self.index_of(key)?;
        let right_key = other.index_of(key)?;

        let mut lookup: HashMap<i64, usize> = HashMap::with_capacity(other.len());
        for r in 0..other.len() {
            let k = other.key_at(r, right_key)?;
            if lookup.insert(k, r).is_some() {
                return Err(TabularError::DuplicateKey { key: k });
            }
        }

        let appended: Vec<usize> = (0..other.columns.len())
            .filter(|&i| i != right_key)
            .collect();

        for r in 0..self.rows.len() {
            let k = self.key_at(r, left_key)?;
            let matched = lookup.get(&k).map(|&i| &other.rows[i]);
            let row = &mut self.rows[r];
            for &i in &appended {
                row.push(matched.map_or(Value::Null, |m| m[i].clone()));
            }
        }
        self.columns
            .extend(appended.iter().map(|&i| other.columns[i].clone()));
        Ok(())
    }

    /// Type of a column as observed from its cells.
    ///
    /// Integers mixed with floats widen to `Float`; any other mix reads as
    /// `Text`. All-null columns are inconclusive.
    pub fn observed_type(&self, name: &str) -> Result<Option<ColumnType>, TabularError> {
        let idx = self.index_of(name)?;
        let mut observed: Option<ColumnType> = None;
        for row in &self.rows {
            let Some(ty) = row[idx].column_type() else {
                continue;
            };
            observed = Some(match observed {
                None => ty,
                Some(prev) if prev == ty => prev,
                Some(ColumnType::Integer) if ty == ColumnType::Float => ColumnType::Float,
                Some(ColumnType::Float) if ty == ColumnType::Integer => ColumnType::Float,
                Some(_) => ColumnType::Text,
            });
        }
        Ok(observed)
    }
}
