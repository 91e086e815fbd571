//! Typed Queries
//!
//! A [`Query`] starts from the mode's target table and left/inner joins the
//! per-mode source tables by melt ID. The three per-mode substitution points
//! (target table, table suffix, trailing condition) are structured fields:
//! table names only ever come from [`Mode`] and [`SourceTable`], and literal
//! values are rendered as bound parameters.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Shared join key of every melt table
pub const MELT_ID: &str = "NPLV";

/// Extraction mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Labelled history (`target_train`, `*_train`)
    Train,
    /// Melts to predict (`sample_submission`, `*_test`)
    Test,
}

/// Rejected mode string
#[derive(Debug, Clone, Error)]
#[error("mode must be 'train' or 'test', got {0:?}")]
pub struct ModeError(pub String);

impl Mode {
    /// Identifier/target table for this mode
    pub fn target_table(&self) -> &'static str {
        match self {
            Mode::Train => "target_train",
            Mode::Test => "sample_submission",
        }
    }

    /// Suffix selecting between the parallel raw tables
    pub fn suffix(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Test => "test",
        }
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Mode::Train),
            "test" => Ok(Mode::Test),
            other => Err(ModeError(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// Raw per-mode source tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTable {
    /// Chronological operation log
    Chronom,
    /// Bulk material additions
    Sip,
    /// Off-gas sensor samples
    Gas,
    /// Melt batch parameters
    Plavki,
    /// Hot metal composition
    Chugun,
}

impl SourceTable {
    /// Table prefix, also used as the relation alias
    pub fn prefix(&self) -> &'static str {
        match self {
            SourceTable::Chronom => "chronom",
            SourceTable::Sip => "sip",
            SourceTable::Gas => "gas",
            SourceTable::Plavki => "plavki",
            SourceTable::Chugun => "chugun",
        }
    }

    /// Physical table name for a mode, e.g. `chronom_train`
    pub fn table_name(&self, mode: Mode) -> String {
        format!("{}_{}", self.prefix(), mode.suffix())
    }
}

/// Trailing condition applied to the target relation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trailing {
    /// Order output rows by melt ID
    pub order_by_melt: bool,
    /// Restrict to the first `n` target melts (by melt ID)
    pub limit: Option<usize>,
}

impl Trailing {
    /// No ordering, no limit
    pub fn none() -> Self {
        Self::default()
    }

    /// Sample of at most `n` melts
    pub fn limit(n: usize) -> Self {
        Self {
            order_by_melt: false,
            limit: Some(n),
        }
    }

    /// Default trailing condition of a mode: test output is ordered by melt
    pub fn for_mode(mode: Mode) -> Self {
        Self {
            order_by_melt: mode == Mode::Test,
            limit: None,
        }
    }
}

/// Join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Keep rows without a match, filling nulls
    Left,
    /// Drop rows without a match
    Inner,
}

/// Extra join condition on top of melt ID equality
#[derive(Debug, Clone, PartialEq)]
pub enum JoinPredicate {
    /// Joined column equals a bound literal
    Equals { column: String, value: Value },
    /// Joined column lies within `[lower, upper]`, both bounds taken from an
    /// earlier relation of the query
    Within {
        column: String,
        bounds: SourceTable,
        lower: String,
        upper: String,
    },
}

impl JoinPredicate {
    pub fn equals(column: &str, value: impl Into<Value>) -> Self {
        JoinPredicate::Equals {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn within(column: &str, bounds: SourceTable, lower: &str, upper: &str) -> Self {
        JoinPredicate::Within {
            column: column.to_string(),
            bounds,
            lower: lower.to_string(),
            upper: upper.to_string(),
        }
    }
}

/// One joined source relation
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: SourceTable,
    pub kind: JoinKind,
    /// Projected columns of the joined table
    pub columns: Vec<String>,
    pub predicates: Vec<JoinPredicate>,
    /// Keep one matching row per melt: the smallest by these columns, then
    /// by the projected columns, nulls last
    pub first_by: Option<Vec<String>>,
}

impl Join {
    pub fn left(table: SourceTable, columns: &[&str]) -> Self {
        Self::new(table, JoinKind::Left, columns)
    }

    pub fn inner(table: SourceTable, columns: &[&str]) -> Self {
        Self::new(table, JoinKind::Inner, columns)
    }

    fn new(table: SourceTable, kind: JoinKind, columns: &[&str]) -> Self {
        Self {
            table,
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            predicates: Vec::new(),
            first_by: None,
        }
    }

    /// Add a join condition
    pub fn when(mut self, predicate: JoinPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Match at most one row per melt, ordered by `keys` first
    pub fn first_by(mut self, keys: &[&str]) -> Self {
        self.first_by = Some(keys.iter().map(|k| k.to_string()).collect());
        self
    }

    /// Sort keys of a single-row join: the given keys, then the projection
    pub fn first_order(&self) -> Option<Vec<&str>> {
        self.first_by.as_ref().map(|keys| {
            keys.iter()
                .chain(self.columns.iter().filter(|c| !keys.contains(*c)))
                .map(String::as_str)
                .collect()
        })
    }
}

/// A typed query rooted at the mode's target table
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    mode: Mode,
    target_columns: Vec<String>,
    joins: Vec<Join>,
    trailing: Trailing,
    /// Order output rows by every projected column
    sorted: bool,
}

/// Rendered SQL text with its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Query {
    /// Select the melt ID from the mode's target table
    pub fn target(mode: Mode) -> Self {
        Self {
            mode,
            target_columns: Vec::new(),
            joins: Vec::new(),
            trailing: Trailing::none(),
            sorted: false,
        }
    }

    /// Additional target-table columns to project
    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.target_columns
            .extend(columns.iter().filter(|c| **c != MELT_ID).map(|c| c.to_string()));
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn trailing(mut self, trailing: Trailing) -> Self {
        self.trailing = trailing;
        self
    }

    /// Order rows by melt ID, then by every other projected column in
    /// projection order
    pub fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn target_columns(&self) -> &[String] {
        &self.target_columns
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn trailing_condition(&self) -> Trailing {
        self.trailing
    }

    /// Output column names in projection order
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(MELT_ID)
            .chain(self.target_columns.iter().map(String::as_str))
            .chain(
                self.joins
                    .iter()
                    .flat_map(|j| j.columns.iter().map(String::as_str)),
            )
            .collect()
    }

    /// Render as PostgreSQL text with `$n` placeholders
    pub fn to_sql(&self) -> SqlStatement {
        let mut params = Vec::new();
        let mut projection = vec![qualified("target", MELT_ID)];
        projection.extend(self.target_columns.iter().map(|c| qualified("target", c)));
        for join in &self.joins {
            projection.extend(join.columns.iter().map(|c| qualified(join.table.prefix(), c)));
        }

        let mut sql = format!("select {}\nfrom (select * from {}", projection.join(", "), quote_ident(self.mode.target_table()));
        if let Some(limit) = self.trailing.limit {
            sql.push_str(&format!(" order by {} limit {}", quote_ident(MELT_ID), limit));
        }
        sql.push_str(") target");

        for join in &self.joins {
            let alias = join.table.prefix();
            let table = quote_ident(&join.table.table_name(self.mode));
            let keyword = match join.kind {
                JoinKind::Left => "left join",
                JoinKind::Inner => "join",
            };
            let mut conditions = vec![format!(
                "{} = {}",
                qualified(alias, MELT_ID),
                qualified("target", MELT_ID)
            )];
            for predicate in &join.predicates {
                match predicate {
                    JoinPredicate::Equals { column, value } => {
                        params.push(value.clone());
                        conditions.push(format!("{} = ${}", qualified(alias, column), params.len()));
                    }
                    JoinPredicate::Within {
                        column,
                        bounds,
                        lower,
                        upper,
                    } => conditions.push(format!(
                        "{} between {} and {}",
                        qualified(alias, column),
                        qualified(bounds.prefix(), lower),
                        qualified(bounds.prefix(), upper)
                    )),
                }
            }
            match join.first_order() {
                None => sql.push_str(&format!(
                    "\n{} {} {} on {}",
                    keyword,
                    table,
                    alias,
                    conditions.join(" and ")
                )),
                Some(order) => {
                    let order: Vec<String> = order.iter().map(|c| qualified(alias, c)).collect();
                    sql.push_str(&format!(
                        "\n{} lateral (select * from {} {} where {} order by {} limit 1) {} on true",
                        keyword,
                        table,
                        alias,
                        conditions.join(" and "),
                        order.join(", "),
                        alias
                    ));
                }
            }
        }

        if self.sorted {
            let positions: Vec<String> = (1..=projection.len()).map(|i| i.to_string()).collect();
            sql.push_str(&format!("\norder by {}", positions.join(", ")));
        } else if self.trailing.order_by_melt {
            sql.push_str(&format!("\norder by {}", qualified("target", MELT_ID)));
        }

        SqlStatement { sql, params }
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(alias: &str, column: &str) -> String {
    format!("{}.{}", alias, quote_ident(column))
}
