//! Melt Outcome Model
//!
//! Regression of end-of-blow temperature (`TST`) and carbon (`C`) from the
//! assembled feature table, with the hit-rate business metric and k-fold
//! evaluation.

mod dual;
mod metric;
mod regressor;

pub use dual::{cross_validate, k_fold, DualTargetModel, Targets};
pub use metric::{hit_rate, C_TOLERANCE, TST_TOLERANCE};
pub use regressor::{MeanRegressor, Regressor, RidgeRegressor};

use feature_engine::FeatureError;
use tabular::TabularError;
use thiserror::Error;

/// Errors during model fitting and evaluation
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model has not been fitted")]
    NotFitted,
    #[error("Training set is empty")]
    EmptyTrainingSet,
    #[error("Nothing to evaluate")]
    EmptyEvaluation,
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("Target {column} is missing or not finite at row {row}")]
    InvalidTarget { column: String, row: usize },
    #[error("Cannot split {samples} samples into {folds} folds")]
    InvalidFolds { folds: usize, samples: usize },
    #[error("Normal equations are singular")]
    Singular,
    #[error("Data error: {0}")]
    Data(#[from] TabularError),
    #[error("Feature error: {0}")]
    Features(#[from] FeatureError),
}
