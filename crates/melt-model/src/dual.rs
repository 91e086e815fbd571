//! Dual-Target Model and Cross-Validation

use crate::metric::hit_rate;
use crate::regressor::Regressor;
use crate::ModelError;
use feature_engine::{FeatureTable, TARGET_COLUMNS};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tabular::Table;
use tracing::{debug, info};

/// Temperature and carbon values, one pair per melt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Targets {
    pub tst: Vec<f64>,
    pub c: Vec<f64>,
}

impl Targets {
    /// Read `TST` and `C` from a table; every value must be present
    pub fn from_table(table: &Table) -> Result<Self, ModelError> {
        let read = |column: &str| -> Result<Vec<f64>, ModelError> {
            table
                .column_values(column)?
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.as_f64()
                        .filter(|x| x.is_finite())
                        .ok_or_else(|| ModelError::InvalidTarget {
                            column: column.to_string(),
                            row,
                        })
                })
                .collect()
        };
        Ok(Self {
            tst: read(TARGET_COLUMNS[0])?,
            c: read(TARGET_COLUMNS[1])?,
        })
    }

    pub fn len(&self) -> usize {
        self.tst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tst.is_empty()
    }

    /// Both series have the same length
    pub fn check(&self) -> Result<(), ModelError> {
        if self.tst.len() != self.c.len() {
            return Err(ModelError::LengthMismatch {
                expected: self.tst.len(),
                actual: self.c.len(),
            });
        }
        Ok(())
    }

    /// Copy of the given rows
    pub fn subset(&self, rows: &[usize]) -> Self {
        Self {
            tst: rows.iter().map(|&r| self.tst[r]).collect(),
            c: rows.iter().map(|&r| self.c[r]).collect(),
        }
    }
}

/// One regressor per target, fitted independently
#[derive(Debug, Clone)]
pub struct DualTargetModel<R: Regressor + Clone> {
    tst: R,
    c: R,
}

impl<R: Regressor + Clone> DualTargetModel<R> {
    /// Both targets start from the same unfitted regressor
    pub fn new(template: R) -> Self {
        Self {
            tst: template.clone(),
            c: template,
        }
    }

    pub fn fit(&mut self, features: &Table, targets: &Targets) -> Result<(), ModelError> {
        targets.check()?;
        info!(
            "Fitting {} regressors on {} melts, {} columns",
            self.tst.name(),
            targets.len(),
            features.columns().len()
        );
        self.tst.fit(features, &targets.tst)?;
        self.c.fit(features, &targets.c)?;
        Ok(())
    }

    /// Fit on the model inputs and targets of an assembled train table
    pub fn fit_table(&mut self, table: &FeatureTable) -> Result<(), ModelError> {
        let targets = Targets::from_table(table.table())?;
        self.fit(&table.features()?, &targets)
    }

    pub fn predict(&self, features: &Table) -> Result<Targets, ModelError> {
        Ok(Targets {
            tst: self.tst.predict(features)?,
            c: self.c.predict(features)?,
        })
    }

    /// Hit rate of the fitted model on labelled rows
    pub fn evaluate(&self, features: &Table, actual: &Targets) -> Result<f64, ModelError> {
        hit_rate(actual, &self.predict(features)?)
    }
}

/// `k` contiguous folds over `n` samples; the first `n % k` folds get one
/// extra sample
pub fn k_fold(n: usize, k: usize) -> Result<Vec<Range<usize>>, ModelError> {
    if k < 2 || k > n {
        return Err(ModelError::InvalidFolds {
            folds: k,
            samples: n,
        });
    }
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    Ok((0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let fold = start..start + len;
            start += len;
            fold
        })
        .collect())
}

/// Per-fold hit rates of a fresh model trained on the remaining folds
pub fn cross_validate<R: Regressor + Clone>(
    template: &R,
    features: &Table,
    targets: &Targets,
    k: usize,
) -> Result<Vec<f64>, ModelError> {
    targets.check()?;
    if features.len() != targets.len() {
        return Err(ModelError::LengthMismatch {
            expected: features.len(),
            actual: targets.len(),
        });
    }

    let mut scores = Vec::with_capacity(k);
    for (i, fold) in k_fold(targets.len(), k)?.into_iter().enumerate() {
        let train: Vec<usize> = (0..targets.len()).filter(|r| !fold.contains(r)).collect();
        let held_out: Vec<usize> = fold.collect();

        let mut model = DualTargetModel::new(template.clone());
        model.fit(&features.subset(&train)?, &targets.subset(&train))?;
        let score = model.evaluate(&features.subset(&held_out)?, &targets.subset(&held_out))?;
        debug!("Fold {}: hit rate {:.4} on {} melts", i, score, held_out.len());
        scores.push(score);
    }
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regressor::{MeanRegressor, RidgeRegressor};
    use proptest::prelude::*;
    use tabular::{ColumnType, Value};

    fn fixture(n: usize) -> (Table, Targets) {
        let mut t = Table::with_columns(&[
            ("NPLV", ColumnType::Integer),
            ("TST", ColumnType::Float),
            ("C", ColumnType::Float),
            ("produv_avg_T", ColumnType::Float),
        ]);
        let mut targets = Targets::default();
        for i in 0..n {
            let temp = 1300.0 + i as f64;
            let tst = 0.5 * temp + 1000.0;
            let c = 0.2 - 0.0001 * temp;
            t.push_row(vec![
                Value::Int(510000 + i as i64),
                Value::Float(tst),
                Value::Float(c),
                Value::Float(temp),
            ])
            .unwrap();
            targets.tst.push(tst);
            targets.c.push(c);
        }
        (t, targets)
    }

    #[test]
    fn test_k_fold_sizes() {
        let folds = k_fold(11, 5).unwrap();
        let sizes: Vec<usize> = folds.iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![3, 2, 2, 2, 2]);
        assert_eq!(folds[0], 0..3);
        assert_eq!(folds[4], 9..11);

        assert!(k_fold(3, 5).is_err());
        assert!(k_fold(10, 1).is_err());
    }

    #[test]
    fn test_targets_from_table() {
        let (t, targets) = fixture(3);
        assert_eq!(Targets::from_table(&t).unwrap(), targets);

        let mut missing = t.clone();
        missing
            .push_row(vec![Value::Int(1), Value::Float(1600.0), Value::Null, Value::Null])
            .unwrap();
        assert!(matches!(
            Targets::from_table(&missing),
            Err(ModelError::InvalidTarget { row: 3, .. })
        ));
    }

    #[test]
    fn test_dual_model_predicts_both_targets() {
        let (t, targets) = fixture(40);
        let features = t.select(&["produv_avg_T"]).unwrap();

        let mut model = DualTargetModel::new(RidgeRegressor::new(1e-6));
        model.fit(&features, &targets).unwrap();

        assert_eq!(model.evaluate(&features, &targets).unwrap(), 1.0);
        let predicted = model.predict(&features).unwrap();
        assert_eq!(predicted.len(), 40);
    }

    #[test]
    fn test_cross_validate_scores_every_fold() {
        let (t, targets) = fixture(25);
        let features = t.select(&["produv_avg_T"]).unwrap();

        let ridge = cross_validate(&RidgeRegressor::new(1e-6), &features, &targets, 5).unwrap();
        assert_eq!(ridge.len(), 5);
        assert!(ridge.iter().all(|s| *s == 1.0));

        let mean = cross_validate(&MeanRegressor::new(), &features, &targets, 5).unwrap();
        assert!(mean.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    proptest! {
        #[test]
        fn prop_folds_partition_samples(n in 2usize..200, k in 2usize..20) {
            prop_assume!(k <= n);
            let folds = k_fold(n, k).unwrap();
            prop_assert_eq!(folds.len(), k);
            prop_assert_eq!(folds[0].start, 0);
            prop_assert_eq!(folds[k - 1].end, n);
            for pair in folds.windows(2) {
                prop_assert_eq!(pair[0].end, pair[1].start);
                prop_assert!(pair[0].len() >= pair[1].len());
            }
        }
    }
}
