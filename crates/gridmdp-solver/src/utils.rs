//! Numeric helpers shared by the experiment runner and export

use statrs::statistics::Statistics;

/// Trailing moving average in "valid" mode.
///
/// Output has `values.len() - window + 1` points; empty when `window` is 0
/// or longer than the series.
#[must_use]
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || window > values.len() {
        return Vec::new();
    }
    let mut sum: f64 = values[..window].iter().sum();
    let mut out = Vec::with_capacity(values.len() - window + 1);
    out.push(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out.push(sum / window as f64);
    }
    out
}

/// Mean and population standard deviation, `(0, 0)` for an empty slice
#[must_use]
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    (values.iter().mean(), values.iter().population_std_dev())
}

/// Round to `decimals` places
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn moving_average_valid_mode() {
        let smoothed = moving_average(&[1.0, 2.0, 3.0, 4.0, 5.0], 2);
        assert_eq!(smoothed, vec![1.5, 2.5, 3.5, 4.5]);
        assert_eq!(moving_average(&[1.0, 2.0], 3), Vec::<f64>::new());
        assert!(moving_average(&[1.0], 0).is_empty());
        assert_eq!(moving_average(&[4.0, 6.0], 2), vec![5.0]);
    }

    #[test]
    fn population_statistics() {
        let (mean, std) = mean_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(mean, 5.0);
        assert_relative_eq!(std, 2.0);
        assert_eq!(mean_std(&[]), (0.0, 0.0));
        assert_eq!(mean_std(&[3.0]), (3.0, 0.0));
    }

    #[test]
    fn rounding() {
        assert_relative_eq!(round_to(-13.999_999_7, 6), -14.0);
        assert_relative_eq!(round_to(0.123_456_789, 6), 0.123_457);
    }
}
