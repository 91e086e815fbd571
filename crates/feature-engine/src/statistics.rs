//! Statistical Summaries

/// Summary statistics of a sample.
///
/// Undefined statistics are `None`: the mean, min and max of an empty
/// sample, and the standard deviation of fewer than two values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    /// Number of values
    pub count: usize,
    /// Sum of values (0 when empty)
    pub sum: f64,
    /// Arithmetic mean
    pub mean: Option<f64>,
    /// Sample standard deviation (n - 1 denominator)
    pub std_dev: Option<f64>,
    /// Minimum value
    pub min: Option<f64>,
    /// Maximum value
    pub max: Option<f64>,
}

impl Summary {
    /// Compute summary statistics from a slice of values
    pub fn compute(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let n = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let mean = sum / n;

        let min = values.iter().cloned().fold(f64::MAX, f64::min);
        let max = values.iter().cloned().fold(f64::MIN, f64::max);

        let std_dev = if values.len() >= 2 {
            let m2: f64 = values.iter().map(|v| (v - mean) * (v - mean)).sum();
            Some((m2 / (n - 1.0)).sqrt())
        } else {
            None
        };

        Self {
            count: values.len(),
            sum,
            mean: Some(mean),
            std_dev,
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Continuous percentile with linear interpolation between closest ranks.
///
/// `fraction` is clamped to `[0, 1]`. Returns `None` for an empty sample.
pub fn percentile_cont(values: &[f64], fraction: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = fraction.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_mean_computation() {
        let stats = Summary::compute(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((stats.mean.unwrap() - 3.0).abs() < 0.001);
        assert_eq!(stats.count, 5);
        assert!((stats.sum - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_std_dev() {
        let stats = Summary::compute(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        // Sample variance 32 / 7
        assert!((stats.std_dev.unwrap() - (32.0f64 / 7.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_single_value_has_no_std_dev() {
        let stats = Summary::compute(&[7.0]);
        assert_eq!(stats.mean, Some(7.0));
        assert_eq!(stats.std_dev, None);
    }

    #[test]
    fn test_empty_values() {
        let stats = Summary::compute(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.sum, 0.0);
        assert_eq!(stats.mean, None);
        assert_eq!(stats.min, None);
    }

    #[test]
    fn test_percentile_interpolation() {
        let values = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile_cont(&values, 0.5), Some(30.0));
        assert!((percentile_cont(&values, 0.1).unwrap() - 14.0).abs() < 1e-9);
        assert!((percentile_cont(&values, 0.9).unwrap() - 46.0).abs() < 1e-9);
        assert_eq!(percentile_cont(&[], 0.5), None);
    }

    proptest! {
        #[test]
        fn prop_summary_bounds(values in prop::collection::vec(-1e6f64..1e6, 1..64)) {
            let stats = Summary::compute(&values);
            let (min, max, mean) = (stats.min.unwrap(), stats.max.unwrap(), stats.mean.unwrap());
            prop_assert!(min <= mean + 1e-6 && mean <= max + 1e-6);
            if let Some(sd) = stats.std_dev {
                prop_assert!(sd >= 0.0);
            }
        }

        #[test]
        fn prop_percentiles_ordered(values in prop::collection::vec(-1e6f64..1e6, 1..64)) {
            let p10 = percentile_cont(&values, 0.1).unwrap();
            let p90 = percentile_cont(&values, 0.9).unwrap();
            let stats = Summary::compute(&values);
            prop_assert!(stats.min.unwrap() <= p10 + 1e-6);
            prop_assert!(p10 <= p90 + 1e-6);
            prop_assert!(p90 <= stats.max.unwrap() + 1e-6);
        }
    }
}
