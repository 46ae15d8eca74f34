use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::error::BacktestError;
use crate::models::{PricePoint, PriceSeries, Spread, SpreadKind};
use crate::Result;

/// Minimum number of common dates for a usable spread
pub const MIN_ALIGNED_POINTS: usize = 2;

/// Walk both legs and yield (date, a, b) for every date they share
fn aligned_pairs(a: &PriceSeries, b: &PriceSeries) -> Vec<(NaiveDate, f64, f64)> {
    let mut pairs = Vec::with_capacity(a.len().min(b.len()));
    let (left, right) = (a.points(), b.points());
    let (mut i, mut j) = (0, 0);

    // Both sides are strictly increasing, so a merge walk finds the intersection
    while i < left.len() && j < right.len() {
        match left[i].date.cmp(&right[j].date) {
            Ordering::Less => i += 1,
            Ordering::Greater => j += 1,
            Ordering::Equal => {
                pairs.push((left[i].date, left[i].value, right[j].value));
                i += 1;
                j += 1;
            }
        }
    }

    pairs
}

/// Dates present in both series, in order
pub fn common_dates(a: &PriceSeries, b: &PriceSeries) -> Vec<NaiveDate> {
    aligned_pairs(a, b).into_iter().map(|(date, _, _)| date).collect()
}

/// Build the spread of `a` against `b` over their common dates
///
/// Dates missing from either leg are dropped from both.
pub fn build_spread(a: &PriceSeries, b: &PriceSeries, kind: SpreadKind) -> Result<Spread> {
    let points: Vec<PricePoint> = aligned_pairs(a, b)
        .into_iter()
        .map(|(date, left, right)| {
            let value = match kind {
                SpreadKind::LogRatio => left.ln() - right.ln(),
                SpreadKind::Ratio => left / right,
            };
            PricePoint::new(date, value)
        })
        .collect();

    if points.len() < MIN_ALIGNED_POINTS {
        return Err(BacktestError::Alignment {
            common: points.len(),
            required: MIN_ALIGNED_POINTS,
        });
    }

    tracing::debug!(
        "Built {:?} spread {}/{}: {} common dates ({} and {} raw)",
        kind,
        a.name(),
        b.name(),
        points.len(),
        a.len(),
        b.len()
    );

    Ok(Spread { kind, points })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn series(name: &str, days: &[u32], values: &[f64]) -> PriceSeries {
        let dates: Vec<NaiveDate> = days.iter().map(|&day| d(day)).collect();
        PriceSeries::from_pairs(name, &dates, values).unwrap()
    }

    #[test]
    fn test_log_spread_values() {
        let a = series("USD_MYR", &[1, 2, 3], &[4.70, 4.72, 4.68]);
        let b = series("USD_SGD", &[1, 2, 3], &[1.34, 1.35, 1.33]);

        let spread = build_spread(&a, &b, SpreadKind::LogRatio).unwrap();
        assert_eq!(spread.len(), 3);
        assert_relative_eq!(spread.points[1].value, (4.72_f64 / 1.35).ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_ratio_spread_values() {
        let a = series("USD_MYR", &[1, 2], &[4.70, 4.72]);
        let b = series("USD_SGD", &[1, 2], &[1.34, 1.35]);

        let spread = build_spread(&a, &b, SpreadKind::Ratio).unwrap();
        assert_relative_eq!(spread.points[0].value, 4.70 / 1.34, epsilon = 1e-12);
    }

    #[test]
    fn test_alignment_drops_missing_dates() {
        // Day 2 missing from b, day 4 missing from a
        let a = series("USD_MYR", &[1, 2, 3, 5], &[4.70, 4.71, 4.72, 4.73]);
        let b = series("USD_SGD", &[1, 3, 4, 5], &[1.34, 1.35, 1.36, 1.37]);

        let spread = build_spread(&a, &b, SpreadKind::LogRatio).unwrap();
        assert_eq!(spread.dates(), vec![d(1), d(3), d(5)]);
        assert_eq!(common_dates(&a, &b), spread.dates());
    }

    #[test]
    fn test_alignment_error_when_overlap_too_small() {
        let a = series("USD_MYR", &[1, 2], &[4.70, 4.71]);
        let b = series("USD_SGD", &[2, 3], &[1.34, 1.35]);

        let err = build_spread(&a, &b, SpreadKind::LogRatio).unwrap_err();
        assert_eq!(
            err,
            BacktestError::Alignment {
                common: 1,
                required: 2
            }
        );
    }
}
