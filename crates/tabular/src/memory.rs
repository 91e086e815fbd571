//! In-Memory Query Backend
//!
//! Interprets [`Query`] against registered tables with the same join, limit
//! and ordering semantics as the PostgreSQL rendering. Used as the mock
//! collaborator in tests and for offline runs over exported tables.

use crate::query::{JoinKind, JoinPredicate, Query, MELT_ID};
use crate::service::QueryService;
use crate::table::{Column, Table};
use crate::value::Value;
use crate::TabularError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info};

/// Query service over in-memory tables
pub struct InMemoryService {
    /// Registered tables by physical name
    tables: Mutex<HashMap<String, Table>>,
    /// Number of queries received
    calls: AtomicUsize,
    /// Queries received, oldest first
    log: Mutex<Vec<Query>>,
    /// Simulated collaborator failure
    failure: Mutex<Option<String>>,
}

impl InMemoryService {
    /// Create an empty service
    pub fn new() -> Self {
        info!("Creating in-memory query service");
        Self {
            tables: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
        }
    }

    /// Register (or replace) a table under its physical name
    pub fn register(&self, name: &str, table: Table) -> Result<(), TabularError> {
        let mut tables = self.tables.lock().map_err(|e| {
            TabularError::DatabaseError(format!("Lock error: {}", e))
        })?;
        debug!("Registering table {} ({} rows)", name, table.len());
        tables.insert(name.to_string(), table);
        Ok(())
    }

    /// Make every subsequent query fail with a database error
    pub fn fail_with(&self, message: &str) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(message.to_string());
        }
    }

    /// Number of queries executed so far, including failed ones
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Copy of the query log
    pub fn queries(&self) -> Vec<Query> {
        self.log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn run(&self, query: &Query) -> Result<Table, TabularError> {
        let tables = self.tables.lock().map_err(|e| {
            TabularError::DatabaseError(format!("Lock error: {}", e))
        })?;
        let lookup = |name: &str| {
            tables
                .get(name)
                .ok_or_else(|| TabularError::UnknownTable(name.to_string()))
        };

        let target = lookup(query.mode().target_table())?;
        let target_key = target.index_of(MELT_ID)?;

        let mut target_rows: Vec<usize> = (0..target.len()).collect();
        if let Some(limit) = query.trailing_condition().limit {
            let mut keyed = target_rows
                .iter()
                .map(|&r| Ok((target.key_at(r, target_key)?, r)))
                .collect::<Result<Vec<_>, TabularError>>()?;
            keyed.sort_by_key(|(k, _)| *k);
            target_rows = keyed.into_iter().take(limit).map(|(_, r)| r).collect();
        }

        let joined = query
            .joins()
            .iter()
            .map(|join| {
                let table = lookup(&join.table.table_name(query.mode()))?;
                let key = table.index_of(MELT_ID)?;
                let mut by_key: HashMap<i64, Vec<usize>> = HashMap::new();
                for r in 0..table.len() {
                    // Null keys never match, as in SQL
                    if table.rows()[r][key].is_null() {
                        continue;
                    }
                    by_key.entry(table.key_at(r, key)?).or_default().push(r);
                }
                Ok((table, by_key))
            })
            .collect::<Result<Vec<_>, TabularError>>()?;

        // Each working row: target row plus the matched row of every join so far
        let mut working: Vec<(usize, Vec<Option<usize>>)> =
            target_rows.into_iter().map(|r| (r, Vec::new())).collect();

        for (j, join) in query.joins().iter().enumerate() {
            let (table, by_key) = &joined[j];
            let first_order = join
                .first_order()
                .map(|order| {
                    order
                        .into_iter()
                        .map(|c| table.index_of(c))
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?;
            let mut next = Vec::with_capacity(working.len());
            for (target_row, matches) in working {
                let key = target.key_at(target_row, target_key)?;
                let mut hits = Vec::new();
                for &candidate in by_key.get(&key).map(Vec::as_slice).unwrap_or(&[]) {
                    if self.satisfies(query, &joined, &matches, join.predicates.as_slice(), table, candidate)? {
                        hits.push(candidate);
                    }
                }
                if let Some(order) = &first_order {
                    hits.sort_by(|&a, &b| {
                        let (a, b) = (&table.rows()[a], &table.rows()[b]);
                        order
                            .iter()
                            .map(|&i| a[i].sort_cmp(&b[i]))
                            .find(|o| o.is_ne())
                            .unwrap_or(std::cmp::Ordering::Equal)
                    });
                    hits.truncate(1);
                }
                if hits.is_empty() {
                    if join.kind == JoinKind::Left {
                        let mut row = matches.clone();
                        row.push(None);
                        next.push((target_row, row));
                    }
                    continue;
                }
                for hit in hits {
                    let mut row = matches.clone();
                    row.push(Some(hit));
                    next.push((target_row, row));
                }
            }
            working = next;
        }

        if query.trailing_condition().order_by_melt {
            let mut keyed = Vec::with_capacity(working.len());
            for entry in working {
                keyed.push((target.key_at(entry.0, target_key)?, entry));
            }
            keyed.sort_by_key(|(k, _)| *k);
            working = keyed.into_iter().map(|(_, e)| e).collect();
        }

        // Projection
        let mut header = vec![target.columns()[target_key].clone()];
        let mut target_idx = Vec::with_capacity(query.target_columns().len());
        for name in query.target_columns() {
            let idx = target.index_of(name)?;
            header.push(target.columns()[idx].clone());
            target_idx.push(idx);
        }
        let mut join_idx = Vec::with_capacity(query.joins().len());
        for (j, join) in query.joins().iter().enumerate() {
            let table = joined[j].0;
            let mut idx = Vec::with_capacity(join.columns.len());
            for name in &join.columns {
                let i = table.index_of(name)?;
                header.push(Column::new(name.clone(), table.columns()[i].ty));
                idx.push(i);
            }
            join_idx.push(idx);
        }

        let mut out = Table::new(header);
        for (target_row, matches) in working {
            let source = &target.rows()[target_row];
            let mut row = vec![source[target_key].clone()];
            row.extend(target_idx.iter().map(|&i| source[i].clone()));
            for (j, idx) in join_idx.iter().enumerate() {
                let table = joined[j].0;
                for &i in idx {
                    row.push(matches[j].map_or(Value::Null, |r| table.rows()[r][i].clone()));
                }
            }
            out.push_row(row)?;
        }
        if query.is_sorted() {
            out.sort_rows();
        }
        Ok(out)
    }

    /// Evaluate join predicates for one candidate row
    fn satisfies(
        &self,
        query: &Query,
        joined: &[(&Table, HashMap<i64, Vec<usize>>)],
        matches: &[Option<usize>],
        predicates: &[JoinPredicate],
        table: &Table,
        candidate: usize,
    ) -> Result<bool, TabularError> {
        for predicate in predicates {
            let holds = match predicate {
                JoinPredicate::Equals { column, value } => {
                    let cell = &table.rows()[candidate][table.index_of(column)?];
                    cell.sql_cmp(value) == Some(std::cmp::Ordering::Equal)
                }
                JoinPredicate::Within {
                    column,
                    bounds,
                    lower,
                    upper,
                } => {
                    let Some(j) = query.joins()[..matches.len()]
                        .iter()
                        .position(|join| join.table == *bounds)
                    else {
                        return Err(TabularError::UnknownTable(bounds.prefix().to_string()));
                    };
                    let bound_table = joined[j].0;
                    match matches[j] {
                        None => false,
                        Some(bound_row) => {
                            let row = &bound_table.rows()[bound_row];
                            let lo = &row[bound_table.index_of(lower)?];
                            let hi = &row[bound_table.index_of(upper)?];
                            let cell = &table.rows()[candidate][table.index_of(column)?];
                            matches!(cell.sql_cmp(lo), Some(o) if o.is_ge())
                                && matches!(cell.sql_cmp(hi), Some(o) if o.is_le())
                        }
                    }
                }
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueryService for InMemoryService {
    async fn execute(&self, query: &Query) -> Result<Table, TabularError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.log.lock() {
            log.push(query.clone());
        }
        if let Some(message) = self.failure.lock().ok().and_then(|f| f.clone()) {
            return Err(TabularError::DatabaseError(message));
        }
        let table = self.run(query)?;
        debug!("In-memory query returned {} rows", table.len());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Join, Mode, SourceTable, Trailing};
    use crate::value::ColumnType;
    use chrono::NaiveDate;

    fn ts(h: u32, m: u32) -> Value {
        Value::Timestamp(
            NaiveDate::from_ymd_opt(2021, 3, 1)
                .unwrap()
                .and_hms_opt(h, m, 0)
                .unwrap(),
        )
    }

    fn service() -> InMemoryService {
        let svc = InMemoryService::new();

        let mut target = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("TST", ColumnType::Float),
            ("C", ColumnType::Float),
        ]);
        for id in [3, 1, 2] {
            target
                .push_row(vec![Value::Int(id), Value::Float(1650.0), Value::Float(0.05)])
                .unwrap();
        }
        svc.register("sample_submission", target).unwrap();

        let mut chronom = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("NOP", ColumnType::Text),
            ("VR_NACH", ColumnType::Timestamp),
            ("VR_KON", ColumnType::Timestamp),
        ]);
        chronom
            .push_row(vec![Value::Int(1), "Продувка".into(), ts(10, 0), ts(10, 20)])
            .unwrap();
        chronom
            .push_row(vec![Value::Int(1), "Слив шлака".into(), ts(10, 30), ts(10, 35)])
            .unwrap();
        svc.register("chronom_test", chronom).unwrap();

        let mut gas = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("Time", ColumnType::Timestamp),
            ("T", ColumnType::Float),
        ]);
        gas.push_row(vec![Value::Int(1), ts(9, 59), Value::Float(100.0)]).unwrap();
        gas.push_row(vec![Value::Int(1), ts(10, 0), Value::Float(200.0)]).unwrap();
        gas.push_row(vec![Value::Int(1), ts(10, 20), Value::Float(300.0)]).unwrap();
        gas.push_row(vec![Value::Int(1), ts(10, 21), Value::Float(400.0)]).unwrap();
        svc.register("gas_test", gas).unwrap();
        svc
    }

    #[tokio::test]
    async fn test_left_join_keeps_every_target_melt() {
        let svc = service();
        let q = Query::target(Mode::Test)
            .join(Join::left(SourceTable::Chronom, &["NOP"]))
            .trailing(Trailing::for_mode(Mode::Test));
        let t = svc.execute(&q).await.unwrap();

        assert_eq!(t.column_names(), vec!["NPLV", "NOP"]);
        assert_eq!(t.keys("NPLV").unwrap(), vec![1, 1, 2, 3]);
        assert_eq!(t.rows()[2][1], Value::Null);
        assert_eq!(svc.calls(), 1);
    }

    #[tokio::test]
    async fn test_inner_join_and_limit() {
        let svc = service();
        let q = Query::target(Mode::Test)
            .columns(&["TST"])
            .join(Join::inner(SourceTable::Chronom, &["NOP"]))
            .trailing(Trailing::limit(2));
        let t = svc.execute(&q).await.unwrap();
        assert_eq!(t.keys("NPLV").unwrap(), vec![1, 1]);
        assert_eq!(t.column_type("TST").unwrap(), ColumnType::Float);
    }

    #[tokio::test]
    async fn test_windowed_join_is_inclusive() {
        let svc = service();
        let q = Query::target(Mode::Test)
            .join(
                Join::inner(SourceTable::Chronom, &["VR_NACH", "VR_KON"])
                    .when(JoinPredicate::equals("NOP", "Продувка")),
            )
            .join(
                Join::inner(SourceTable::Gas, &["T"])
                    .when(JoinPredicate::within("Time", SourceTable::Chronom, "VR_NACH", "VR_KON")),
            );
        let t = svc.execute(&q).await.unwrap();
        let temps: Vec<f64> = t
            .column_values("T")
            .unwrap()
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();
        assert_eq!(temps, vec![200.0, 300.0]);
    }

    #[tokio::test]
    async fn test_single_row_join_keeps_earliest_key() {
        let svc = service();
        let mut plavki = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("PLAVKA_VR_KON", ColumnType::Timestamp),
        ]);
        plavki.push_row(vec![Value::Int(1), ts(12, 0)]).unwrap();
        plavki.push_row(vec![Value::Int(1), Value::Null]).unwrap();
        plavki.push_row(vec![Value::Int(1), ts(11, 0)]).unwrap();
        plavki.push_row(vec![Value::Int(2), Value::Null]).unwrap();
        svc.register("plavki_test", plavki).unwrap();

        let q = Query::target(Mode::Test)
            .join(Join::left(SourceTable::Plavki, &["PLAVKA_VR_KON"]).first_by(&["PLAVKA_VR_KON"]))
            .sorted();
        let t = svc.execute(&q).await.unwrap();

        assert_eq!(t.keys("NPLV").unwrap(), vec![1, 2, 3]);
        assert_eq!(
            t.column_values("PLAVKA_VR_KON").unwrap(),
            vec![&ts(11, 0), &Value::Null, &Value::Null]
        );
    }

    #[tokio::test]
    async fn test_sorted_rows_ignore_registration_order() {
        let samples = [(10, 300.0), (5, 200.0), (5, 100.0), (0, 50.0)];
        let register = |rows: &mut dyn Iterator<Item = &(u32, f64)>| {
            let svc = service();
            let mut gas = Table::with_columns(&[
                ("NPLV", ColumnType::Integer),
                ("Time", ColumnType::Timestamp),
                ("T", ColumnType::Float),
            ]);
            for &(m, temp) in rows {
                gas.push_row(vec![Value::Int(1), ts(10, m), Value::Float(temp)]).unwrap();
            }
            svc.register("gas_test", gas).unwrap();
            svc
        };
        let forward = register(&mut samples.iter());
        let reversed = register(&mut samples.iter().rev());

        let q = Query::target(Mode::Test)
            .join(Join::inner(SourceTable::Gas, &["Time", "T"]))
            .sorted();
        let a = forward.execute(&q).await.unwrap();
        let b = reversed.execute(&q).await.unwrap();

        assert_eq!(a, b);
        let temps: Vec<f64> = a
            .column_values("T")
            .unwrap()
            .iter()
            .filter_map(|v| v.as_f64())
            .collect();
        assert_eq!(temps, vec![50.0, 100.0, 200.0, 300.0]);
    }

    #[tokio::test]
    async fn test_unknown_table_and_failure() {
        let svc = service();
        let q = Query::target(Mode::Train);
        assert!(matches!(
            svc.execute(&q).await,
            Err(TabularError::UnknownTable(name)) if name == "target_train"
        ));

        svc.fail_with("connection reset");
        let q = Query::target(Mode::Test);
        assert!(matches!(svc.execute(&q).await, Err(TabularError::DatabaseError(_))));
        assert_eq!(svc.calls(), 2);
        assert_eq!(svc.queries().len(), 2);
    }
}
