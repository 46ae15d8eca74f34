/// Standard deviations below this are treated as zero
pub const MIN_STD_DEV: f64 = 1e-12;

/// Calculate the arithmetic mean of a window
pub fn calculate_mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }

    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Calculate the sample standard deviation (n - 1 denominator)
pub fn calculate_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }

    let mean = calculate_mean(values)?;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (values.len() - 1) as f64;

    Some(variance.sqrt())
}

/// Z-score of `value` against the mean and sample deviation of `window`
///
/// A flat window has no spread to measure against, so the score is 0.
pub fn calculate_zscore(value: f64, window: &[f64]) -> Option<f64> {
    let mean = calculate_mean(window)?;
    let std_dev = calculate_std(window)?;

    if std_dev < MIN_STD_DEV {
        return Some(0.0);
    }

    Some((value - mean) / std_dev)
}
