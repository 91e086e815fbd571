//! Aggregator Seam and Grouping Helpers

use crate::error::FeatureError;
use crate::schema::FeatureColumn;
use std::collections::BTreeMap;
use tabular::{Column, ColumnType, Join, Mode, Query, SourceTable, Table, Value, MELT_ID};

/// Melt end time column joined in from the batch parameters
pub const MELT_END: &str = "PLAVKA_VR_KON";

/// One per-source feature group.
///
/// `query` describes the source rows for a mode; `aggregate` reduces the
/// result to exactly one row per melt present in it, keyed by `NPLV` and
/// followed by the declared columns in declaration order.
pub trait Aggregator: Send + Sync {
    /// Short name used in logs and the fitted schema
    fn name(&self) -> &'static str;

    /// Declared output columns, excluding the melt ID
    fn schema(&self) -> &[FeatureColumn];

    /// Source query for a mode
    fn query(&self, mode: Mode) -> Query;

    /// Reduce a query result to one row per melt
    fn aggregate(&self, source: &Table) -> Result<Table, FeatureError>;
}

/// Source rows grouped by melt, in ascending melt order.
///
/// Melts whose only row is the null-extended row of a left join are kept
/// with that row, so every melt of the target relation gets an output row.
pub(crate) fn group_by_melt(source: &Table) -> Result<BTreeMap<i64, Vec<&[Value]>>, FeatureError> {
    let key = source.index_of(MELT_ID)?;
    let mut groups: BTreeMap<i64, Vec<&[Value]>> = BTreeMap::new();
    for (r, row) in source.rows().iter().enumerate() {
        groups
            .entry(source.key_at(r, key)?)
            .or_default()
            .push(row.as_slice());
    }
    Ok(groups)
}

/// One melt end per melt: the earliest `PLAVKA_VR_KON` among duplicate
/// batch rows, so repeated batch rows never multiply source rows
pub(crate) fn melt_end_join() -> Join {
    Join::left(SourceTable::Plavki, &[MELT_END]).first_by(&[MELT_END])
}

/// Strictly-before test against the melt end; nulls never pass
pub(crate) fn before_melt_end(at: &Value, melt_end: &Value) -> bool {
    match (at.as_timestamp(), melt_end.as_timestamp()) {
        (Some(at), Some(end)) => at < end,
        _ => false,
    }
}

/// Empty output table for a declared schema
pub(crate) fn output_table(schema: &[FeatureColumn]) -> Table {
    let mut columns = vec![Column::new(MELT_ID, ColumnType::Integer)];
    columns.extend(
        schema
            .iter()
            .map(|c| Column::new(c.name.clone(), c.ty.column_type())),
    );
    Table::new(columns)
}

/// Optional float as a cell
pub(crate) fn float_or_null(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::Float)
}
