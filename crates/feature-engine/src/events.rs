//! Chronological Event Features
//!
//! Filtered aggregation over the operation log: each catalogued statistic is
//! a count or a sum restricted to events whose operation label matches.

use crate::aggregator::{before_melt_end, group_by_melt, melt_end_join, output_table, Aggregator, MELT_END};
use crate::error::FeatureError;
use crate::schema::{FeatureColumn, SemanticType};
use tabular::{Join, Mode, Query, SourceTable, Table, Value};
use tracing::debug;

const LABEL: &str = "NOP";
const STARTED: &str = "VR_NACH";
const FINISHED: &str = "VR_KON";
const PAYLOAD: &str = "O2";

/// Operation label filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelMatch {
    /// Every event
    Any,
    /// Label equal to the given text
    Exact(&'static str),
    /// Label starting with the given text
    Prefix(&'static str),
}

impl LabelMatch {
    pub fn matches(&self, label: Option<&str>) -> bool {
        match (self, label) {
            (LabelMatch::Any, _) => true,
            (LabelMatch::Exact(want), Some(label)) => label == *want,
            (LabelMatch::Prefix(prefix), Some(label)) => label.starts_with(prefix),
            _ => false,
        }
    }
}

/// What a statistic accumulates over matching events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    /// Number of events
    Count,
    /// Sum of the oxygen payload, missing payloads as 0
    PayloadSum,
    /// Sum of per-event whole minutes between start and end
    DurationMinutes,
    /// Sum of per-event whole seconds between start and end
    DurationSeconds,
}

/// One named filtered aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventStatistic {
    pub name: &'static str,
    pub label: LabelMatch,
    pub measure: Measure,
}

const fn stat(name: &'static str, label: LabelMatch, measure: Measure) -> EventStatistic {
    EventStatistic {
        name,
        label,
        measure,
    }
}

/// Default statistic catalogue
pub const EVENT_CATALOGUE: &[EventStatistic] = &[
    stat("sum_O2", LabelMatch::Any, Measure::PayloadSum),
    stat("lom_nagrev_total_minutes", LabelMatch::Exact("Нагрев лома"), Measure::DurationMinutes),
    stat("torcr_count", LabelMatch::Exact("Полусухое торкрет."), Measure::Count),
    stat("sliv_shlaka_total_sec", LabelMatch::Exact("Слив шлака"), Measure::DurationSeconds),
    stat("garnisazh_cnt", LabelMatch::Exact("Наведение гарнисажа"), Measure::Count),
    stat("obr_gorl_total_sec", LabelMatch::Exact("Обрыв горловины"), Measure::DurationSeconds),
    stat("ots_02_total_sec", LabelMatch::Exact("Отсутствие O2"), Measure::DurationSeconds),
    stat("produv_total_sec", LabelMatch::Exact("Продувка"), Measure::DurationSeconds),
    stat("neispr_cnt", LabelMatch::Prefix("Неиспр"), Measure::Count),
    stat("neispr_total_sec", LabelMatch::Prefix("Неиспр"), Measure::DurationSeconds),
];

/// Accumulated value of one statistic
#[derive(Debug, Clone, Copy)]
enum Acc {
    Int(i64),
    Float(f64),
}

/// Aggregator over the chronological operation log
pub struct EventAggregator {
    catalogue: Vec<EventStatistic>,
    schema: Vec<FeatureColumn>,
}

impl EventAggregator {
    /// Create an aggregator for a statistic catalogue
    pub fn new(catalogue: &[EventStatistic]) -> Self {
        let schema = catalogue
            .iter()
            .map(|s| {
                let ty = match s.measure {
                    Measure::PayloadSum => SemanticType::Float,
                    _ => SemanticType::Integer,
                };
                FeatureColumn::new(s.name, ty)
            })
            .collect();
        Self {
            catalogue: catalogue.to_vec(),
            schema,
        }
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new(EVENT_CATALOGUE)
    }
}

impl Aggregator for EventAggregator {
    fn name(&self) -> &'static str {
        "events"
    }

    fn schema(&self) -> &[FeatureColumn] {
        &self.schema
    }

    fn query(&self, mode: Mode) -> Query {
        Query::target(mode)
            .join(Join::left(
                SourceTable::Chronom,
                &[STARTED, FINISHED, LABEL, PAYLOAD],
            ))
            .join(melt_end_join())
            .sorted()
    }

    fn aggregate(&self, source: &Table) -> Result<Table, FeatureError> {
        let label = source.index_of(LABEL)?;
        let started = source.index_of(STARTED)?;
        let finished = source.index_of(FINISHED)?;
        let payload = source.index_of(PAYLOAD)?;
        let melt_end = source.index_of(MELT_END)?;

        let mut out = output_table(&self.schema);
        let mut discarded = 0usize;

        for (melt, rows) in group_by_melt(source)? {
            let mut acc: Vec<Acc> = self
                .catalogue
                .iter()
                .map(|s| match s.measure {
                    Measure::PayloadSum => Acc::Float(0.0),
                    _ => Acc::Int(0),
                })
                .collect();

            for row in rows {
                // Left-join padding rows have no end time and drop out here too
                if !before_melt_end(&row[finished], &row[melt_end]) {
                    if !row[finished].is_null() {
                        discarded += 1;
                    }
                    continue;
                }
                let duration = match (row[started].as_timestamp(), row[finished].as_timestamp()) {
                    (Some(start), Some(end)) => Some(end - start),
                    _ => None,
                };

                for (stat, slot) in self.catalogue.iter().zip(acc.iter_mut()) {
                    if !stat.label.matches(row[label].as_str()) {
                        continue;
                    }
                    match (stat.measure, slot) {
                        (Measure::Count, Acc::Int(n)) => *n += 1,
                        (Measure::PayloadSum, Acc::Float(sum)) => {
                            *sum += row[payload].as_f64().unwrap_or(0.0)
                        }
                        (Measure::DurationMinutes, Acc::Int(total)) => {
                            *total += duration.map_or(0, |d| d.num_minutes())
                        }
                        (Measure::DurationSeconds, Acc::Int(total)) => {
                            *total += duration.map_or(0, |d| d.num_seconds())
                        }
                        _ => {}
                    }
                }
            }

            let mut row = Vec::with_capacity(acc.len() + 1);
            row.push(Value::Int(melt));
            row.extend(acc.into_iter().map(|a| match a {
                Acc::Int(v) => Value::Int(v),
                Acc::Float(v) => Value::Float(v),
            }));
            out.push_row(row)?;
        }

        debug!(
            "Event features for {} melts ({} events after melt end discarded)",
            out.len(),
            discarded
        );
        Ok(out)
    }
}
