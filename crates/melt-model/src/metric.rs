//! Hit-Rate Metric
//!
//! A prediction hits when it lands within the plant tolerance of the
//! measured value; the score averages temperature and carbon hits.

use crate::dual::Targets;
use crate::ModelError;

/// Carbon tolerance, mass fraction
pub const C_TOLERANCE: f64 = 0.02;

/// Temperature tolerance, degrees
pub const TST_TOLERANCE: f64 = 20.0;

/// `(hits_C + hits_TST) / 2 / n`
pub fn hit_rate(actual: &Targets, predicted: &Targets) -> Result<f64, ModelError> {
    actual.check()?;
    predicted.check()?;
    if predicted.len() != actual.len() {
        return Err(ModelError::LengthMismatch {
            expected: actual.len(),
            actual: predicted.len(),
        });
    }
    if actual.is_empty() {
        return Err(ModelError::EmptyEvaluation);
    }

    let hits = |a: &[f64], p: &[f64], tolerance: f64| {
        a.iter()
            .zip(p)
            .filter(|(a, p)| (*a - *p).abs() < tolerance)
            .count()
    };
    let c = hits(&actual.c, &predicted.c, C_TOLERANCE);
    let tst = hits(&actual.tst, &predicted.tst, TST_TOLERANCE);

    Ok((c + tst) as f64 / 2.0 / actual.len() as f64)
}
