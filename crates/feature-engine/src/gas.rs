//! Off-Gas Sensor Features
//!
//! Two variants over the gas analyser stream:
//! - raw: per-channel moments over every sample before the melt end
//! - process-windowed: order statistics of one channel over the samples
//!   taken during a named operation (time-windowed join against the
//!   operation log)

use crate::aggregator::{
    before_melt_end, float_or_null, group_by_melt, melt_end_join, output_table, Aggregator, MELT_END,
};
use crate::error::FeatureError;
use crate::schema::{FeatureColumn, SemanticType};
use crate::statistics::{percentile_cont, Summary};
use serde::{Deserialize, Serialize};
use tabular::{Join, JoinPredicate, Mode, Query, SourceTable, Table, Value};
use tracing::debug;

const SAMPLED_AT: &str = "Time";

/// Gas analyser channels: volume, temperature and gas species
pub const GAS_CHANNELS: &[&str] = &["V", "T", "AR", "CO", "CO2", "H2", "O2", "N2"];

/// Aggregator over all gas samples of a melt
pub struct GasAggregator {
    channels: Vec<&'static str>,
    include_extrema: bool,
    schema: Vec<FeatureColumn>,
}

impl GasAggregator {
    /// Mean and deviation per channel, plus min/max when `include_extrema`
    pub fn new(channels: &[&'static str], include_extrema: bool) -> Self {
        let mut schema = Vec::new();
        for ch in channels {
            schema.push(FeatureColumn::new(format!("avg_{}", ch), SemanticType::Float));
            schema.push(FeatureColumn::new(format!("srd_{}", ch), SemanticType::Float));
            if include_extrema {
                schema.push(FeatureColumn::new(format!("min_{}", ch), SemanticType::Float));
                schema.push(FeatureColumn::new(format!("max_{}", ch), SemanticType::Float));
            }
        }
        Self {
            channels: channels.to_vec(),
            include_extrema,
            schema,
        }
    }
}

impl Default for GasAggregator {
    fn default() -> Self {
        Self::new(GAS_CHANNELS, false)
    }
}

impl Aggregator for GasAggregator {
    fn name(&self) -> &'static str {
        "gas"
    }

    fn schema(&self) -> &[FeatureColumn] {
        &self.schema
    }

    fn query(&self, mode: Mode) -> Query {
        let mut columns = vec![SAMPLED_AT];
        columns.extend(self.channels.iter().copied());
        Query::target(mode)
            .join(Join::left(SourceTable::Gas, &columns))
            .join(melt_end_join())
            .sorted()
    }

    fn aggregate(&self, source: &Table) -> Result<Table, FeatureError> {
        let sampled_at = source.index_of(SAMPLED_AT)?;
        let melt_end = source.index_of(MELT_END)?;
        let channels = self
            .channels
            .iter()
            .map(|ch| source.index_of(ch))
            .collect::<Result<Vec<_>, _>>()?;

        let mut out = output_table(&self.schema);

        for (melt, rows) in group_by_melt(source)? {
            let samples: Vec<&[Value]> = rows
                .into_iter()
                .filter(|row| before_melt_end(&row[sampled_at], &row[melt_end]))
                .collect();

            let mut row = Vec::with_capacity(self.schema.len() + 1);
            row.push(Value::Int(melt));
            for &ch in &channels {
                let values: Vec<f64> = samples.iter().filter_map(|s| s[ch].as_f64()).collect();
                let stats = Summary::compute(&values);
                row.push(float_or_null(stats.mean));
                row.push(float_or_null(stats.std_dev));
                if self.include_extrema {
                    row.push(float_or_null(stats.min));
                    row.push(float_or_null(stats.max));
                }
            }
            out.push_row(row)?;
        }

        debug!("Gas features for {} melts", out.len());
        Ok(out)
    }
}

/// Which operation bounds the window and which channel is summarised
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSpec {
    /// Operation label in the chronological log
    pub operation: String,
    /// Output column prefix
    pub prefix: String,
    /// Gas channel
    pub channel: String,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            operation: "Продувка".to_string(),
            prefix: "produv".to_string(),
            channel: "T".to_string(),
        }
    }
}

/// Aggregator over gas samples taken during one named operation.
///
/// A sample belongs to the window when its time lies within
/// `[VR_NACH, VR_KON]` of a matching operation of the same melt; a sample
/// inside two overlapping windows counts once per window.
pub struct GasWindowAggregator {
    spec: WindowSpec,
    schema: Vec<FeatureColumn>,
}

impl GasWindowAggregator {
    pub fn new(spec: WindowSpec) -> Self {
        let schema = ["avg", "srd", "min", "p10", "p90"]
            .iter()
            .map(|stat| {
                FeatureColumn::new(
                    format!("{}_{}_{}", spec.prefix, stat, spec.channel),
                    SemanticType::Float,
                )
            })
            .collect();
        Self { spec, schema }
    }
}

impl Default for GasWindowAggregator {
    fn default() -> Self {
        Self::new(WindowSpec::default())
    }
}

impl Aggregator for GasWindowAggregator {
    fn name(&self) -> &'static str {
        "gas_window"
    }

    fn schema(&self) -> &[FeatureColumn] {
        &self.schema
    }

    fn query(&self, mode: Mode) -> Query {
        Query::target(mode)
            .join(
                Join::left(SourceTable::Chronom, &["VR_NACH", "VR_KON"])
                    .when(JoinPredicate::equals("NOP", self.spec.operation.as_str())),
            )
            .join(
                Join::left(SourceTable::Gas, &[SAMPLED_AT, self.spec.channel.as_str()])
                    .when(JoinPredicate::within(
                        SAMPLED_AT,
                        SourceTable::Chronom,
                        "VR_NACH",
                        "VR_KON",
                    )),
            )
            .join(melt_end_join())
            .sorted()
    }

    fn aggregate(&self, source: &Table) -> Result<Table, FeatureError> {
        let sampled_at = source.index_of(SAMPLED_AT)?;
        let channel = source.index_of(&self.spec.channel)?;
        let melt_end = source.index_of(MELT_END)?;

        let mut out = output_table(&self.schema);
        let mut empty = 0usize;

        for (melt, rows) in group_by_melt(source)? {
            let values: Vec<f64> = rows
                .iter()
                .filter(|row| before_melt_end(&row[sampled_at], &row[melt_end]))
                .filter_map(|row| row[channel].as_f64())
                .collect();
            if values.is_empty() {
                empty += 1;
            }

            let stats = Summary::compute(&values);
            out.push_row(vec![
                Value::Int(melt),
                float_or_null(stats.mean),
                float_or_null(stats.std_dev),
                float_or_null(stats.min),
                float_or_null(percentile_cont(&values, 0.1)),
                float_or_null(percentile_cont(&values, 0.9)),
            ])?;
        }

        debug!(
            "Windowed gas features for {} melts ({} without samples during {})",
            out.len(),
            empty,
            self.spec.operation
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};
    use tabular::{ColumnType, InMemoryService, QueryService};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 2, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn value(t: &Table, melt: i64, column: &str) -> Value {
        let r = t.keys("NPLV").unwrap().iter().position(|k| *k == melt).unwrap();
        t.rows()[r][t.index_of(column).unwrap()].clone()
    }

    #[test]
    fn test_raw_moments() {
        let agg = GasAggregator::new(&["V", "T"], true);
        let mut t = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("Time", ColumnType::Timestamp),
            ("V", ColumnType::Float),
            ("T", ColumnType::Float),
            ("PLAVKA_VR_KON", ColumnType::Timestamp),
        ]);
        for (m, v, temp) in [(1, 10.0, 100.0), (2, 20.0, 300.0), (50, 99.0, 999.0)] {
            t.push_row(vec![Value::Int(1), at(10, m).into(), Value::Float(v), Value::Float(temp), at(10, 30).into()])
                .unwrap();
        }
        t.push_row(vec![Value::Int(2), Value::Null, Value::Null, Value::Null, at(10, 30).into()])
            .unwrap();

        let out = agg.aggregate(&t).unwrap();

        assert_eq!(out.column_names().len(), 9);
        assert_eq!(value(&out, 1, "avg_V"), Value::Float(15.0));
        assert_eq!(value(&out, 1, "max_T"), Value::Float(300.0));
        let srd = value(&out, 1, "srd_T").as_f64().unwrap();
        assert!((srd - 20000.0f64.sqrt()).abs() < 1e-9);
        assert_eq!(value(&out, 2, "avg_V"), Value::Null);
        assert_eq!(value(&out, 2, "srd_T"), Value::Null);
    }

    #[test]
    fn test_default_schema_names() {
        let agg = GasAggregator::default();
        let names: Vec<&str> = agg.schema().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), 16);
        assert_eq!(&names[..4], &["avg_V", "srd_V", "avg_T", "srd_T"]);

        let window = GasWindowAggregator::default();
        assert_eq!(window.schema()[4].name, "produv_p90_T");
    }

    /// Melt 1 blows 10:00..10:10 and ends at 11:00; melt 2 never blows;
    /// melt 3 blows 12:00..12:10 but ends at 12:05 (duplicate batch rows)
    fn blow_service() -> InMemoryService {
        let svc = InMemoryService::new();

        let mut target = Table::with_columns(&[("NPLV", ColumnType::Integer)]);
        for id in [1, 2, 3] {
            target.push_row(vec![Value::Int(id)]).unwrap();
        }
        svc.register("target_train", target).unwrap();

        let mut chronom = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("NOP", ColumnType::Text),
            ("VR_NACH", ColumnType::Timestamp),
            ("VR_KON", ColumnType::Timestamp),
        ]);
        chronom
            .push_row(vec![Value::Int(1), "Продувка".into(), at(10, 0).into(), at(10, 10).into()])
            .unwrap();
        chronom
            .push_row(vec![Value::Int(1), "Слив шлака".into(), at(10, 20).into(), at(10, 25).into()])
            .unwrap();
        chronom
            .push_row(vec![Value::Int(3), "Продувка".into(), at(12, 0).into(), at(12, 10).into()])
            .unwrap();
        svc.register("chronom_train", chronom).unwrap();

        let mut gas = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("Time", ColumnType::Timestamp),
            ("T", ColumnType::Float),
        ]);
        for m in 0..=25u32 {
            gas.push_row(vec![Value::Int(1), at(10, m).into(), Value::Float(m as f64 * 10.0)])
                .unwrap();
        }
        for (m, temp) in [(0, 1500.0), (3, 1520.0), (5, 1600.0), (8, 1700.0)] {
            gas.push_row(vec![Value::Int(3), at(12, m).into(), Value::Float(temp)])
                .unwrap();
        }
        svc.register("gas_train", gas).unwrap();

        let mut plavki = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("PLAVKA_VR_KON", ColumnType::Timestamp),
        ]);
        for (id, end) in [(1, at(11, 0)), (2, at(11, 0)), (3, at(13, 0)), (3, at(12, 5))] {
            plavki.push_row(vec![Value::Int(id), end.into()]).unwrap();
        }
        svc.register("plavki_train", plavki).unwrap();
        svc
    }

    #[tokio::test]
    async fn test_blow_window_through_query() {
        let svc = blow_service();
        let agg = GasWindowAggregator::default();
        let source = svc.execute(&agg.query(Mode::Train)).await.unwrap();
        let out = agg.aggregate(&source).unwrap();

        // Samples at minutes 0..=10 inclusive: 0, 10, ..., 100
        assert_eq!(value(&out, 1, "produv_avg_T"), Value::Float(50.0));
        assert_eq!(value(&out, 1, "produv_min_T"), Value::Float(0.0));
        assert_eq!(value(&out, 1, "produv_p10_T"), Value::Float(10.0));
        assert_eq!(value(&out, 1, "produv_p90_T"), Value::Float(90.0));
        // No blow for melt 2: nulls, not an error
        assert_eq!(value(&out, 2, "produv_avg_T"), Value::Null);
        assert_eq!(value(&out, 2, "produv_p90_T"), Value::Null);
    }

    #[tokio::test]
    async fn test_blow_window_stops_at_melt_end() {
        let svc = blow_service();
        let agg = GasWindowAggregator::default();
        let source = svc.execute(&agg.query(Mode::Train)).await.unwrap();
        let out = agg.aggregate(&source).unwrap();

        // Only 12:00 and 12:03 precede the 12:05 end; 12:05 itself is excluded
        assert_eq!(value(&out, 3, "produv_avg_T"), Value::Float(1510.0));
        assert_eq!(value(&out, 3, "produv_min_T"), Value::Float(1500.0));
        let p90 = value(&out, 3, "produv_p90_T").as_f64().unwrap();
        assert!((p90 - 1518.0).abs() < 1e-9);
        let srd = value(&out, 3, "produv_srd_T").as_f64().unwrap();
        assert!((srd - 200.0f64.sqrt()).abs() < 1e-9);
    }
}
