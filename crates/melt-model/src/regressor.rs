//! Single-Target Regressors

use crate::ModelError;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use tabular::{ColumnType, Table};
use tracing::debug;

/// A regressor over the numeric columns of a feature table
pub trait Regressor: Send + Sync {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// Fit on a feature table and one target value per row
    fn fit(&mut self, features: &Table, target: &[f64]) -> Result<(), ModelError>;

    /// One prediction per row
    fn predict(&self, features: &Table) -> Result<Vec<f64>, ModelError>;
}

fn check_target(features: &Table, target: &[f64]) -> Result<(), ModelError> {
    if target.len() != features.len() {
        return Err(ModelError::LengthMismatch {
            expected: features.len(),
            actual: target.len(),
        });
    }
    if target.is_empty() {
        return Err(ModelError::EmptyTrainingSet);
    }
    if let Some(row) = target.iter().position(|v| !v.is_finite()) {
        return Err(ModelError::InvalidTarget {
            column: "target".to_string(),
            row,
        });
    }
    Ok(())
}

/// Predicts the training mean for every row
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeanRegressor {
    mean: Option<f64>,
}

impl MeanRegressor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Regressor for MeanRegressor {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn fit(&mut self, features: &Table, target: &[f64]) -> Result<(), ModelError> {
        check_target(features, target)?;
        self.mean = Some(target.iter().sum::<f64>() / target.len() as f64);
        Ok(())
    }

    fn predict(&self, features: &Table) -> Result<Vec<f64>, ModelError> {
        let mean = self.mean.ok_or(ModelError::NotFitted)?;
        Ok(vec![mean; features.len()])
    }
}

/// L2-regularised linear regression on standardised numeric features.
///
/// Integer and float columns are used; categorical, text and temporal
/// columns are ignored. Missing and non-finite cells are imputed with the
/// training mean of their column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegressor {
    alpha: f64,
    columns: Vec<String>,
    means: Vec<f64>,
    scales: Vec<f64>,
    weights: Vec<f64>,
    intercept: Option<f64>,
}

impl RidgeRegressor {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            columns: Vec::new(),
            means: Vec::new(),
            scales: Vec::new(),
            weights: Vec::new(),
            intercept: None,
        }
    }

    /// Numeric columns seen at fit time
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column cells as finite floats
    fn numeric(features: &Table, column: &str) -> Result<Vec<Option<f64>>, ModelError> {
        Ok(features
            .column_values(column)?
            .into_iter()
            .map(|v| v.as_f64().filter(|x| x.is_finite()))
            .collect())
    }

    fn standardise(&self, j: usize, value: Option<f64>) -> f64 {
        value.map_or(0.0, |v| (v - self.means[j]) / self.scales[j])
    }

    /// Standardised design matrix, one row per table row
    fn design(&self, raw: &[Vec<Option<f64>>], rows: usize) -> Array2<f64> {
        Array2::from_shape_fn((rows, self.columns.len()), |(i, j)| {
            self.standardise(j, raw[j][i])
        })
    }
}

impl Default for RidgeRegressor {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Regressor for RidgeRegressor {
    fn name(&self) -> &'static str {
        "ridge"
    }

    fn fit(&mut self, features: &Table, target: &[f64]) -> Result<(), ModelError> {
        check_target(features, target)?;

        let columns: Vec<String> = features
            .columns()
            .iter()
            .filter(|c| matches!(c.ty, ColumnType::Integer | ColumnType::Float))
            .map(|c| c.name.clone())
            .collect();
        let raw = columns
            .iter()
            .map(|c| Self::numeric(features, c))
            .collect::<Result<Vec<_>, _>>()?;

        self.columns = columns;
        self.means.clear();
        self.scales.clear();
        for cells in &raw {
            let present: Vec<f64> = cells.iter().flatten().copied().collect();
            let mean = if present.is_empty() {
                0.0
            } else {
                present.iter().sum::<f64>() / present.len() as f64
            };
            let var = if present.is_empty() {
                0.0
            } else {
                present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / present.len() as f64
            };
            self.means.push(mean);
            self.scales.push(if var > 1e-12 { var.sqrt() } else { 1.0 });
        }

        let n = target.len();
        let p = self.columns.len();
        let x = self.design(&raw, n);
        let y = Array1::from_vec(target.to_vec());
        let y_mean = y.sum() / n as f64;

        let mut gram = x.t().dot(&x);
        gram.diag_mut().mapv_inplace(|d| d + self.alpha);
        let rhs = x.t().dot(&(&y - y_mean));

        self.weights = solve(gram, rhs)?.to_vec();
        self.intercept = Some(y_mean);
        debug!("Ridge fitted on {} rows, {} numeric columns", n, p);
        Ok(())
    }

    fn predict(&self, features: &Table) -> Result<Vec<f64>, ModelError> {
        let intercept = self.intercept.ok_or(ModelError::NotFitted)?;
        let raw = self
            .columns
            .iter()
            .map(|c| Self::numeric(features, c))
            .collect::<Result<Vec<_>, _>>()?;

        let x = self.design(&raw, features.len());
        let weights = Array1::from_vec(self.weights.clone());
        Ok((x.dot(&weights) + intercept).to_vec())
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .ok_or(ModelError::Singular)?;
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(ModelError::Singular);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                let delta = factor * a[[col, k]];
                a[[row, k]] -= delta;
            }
            let delta = factor * b[col];
            b[row] -= delta;
        }
    }

    let mut x = Array1::<f64>::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}
