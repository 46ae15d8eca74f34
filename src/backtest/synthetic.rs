use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::models::{PricePoint, PriceSeries};

/// Market scenario types for synthetic FX pair generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketScenario {
    /// Log spread pulled back to a fixed mean (Ornstein-Uhlenbeck)
    MeanReverting,
    /// Log spread drifts steadily with no pull back
    Trending,
    /// Mean-reverting, but the mean jumps halfway through
    RegimeShift,
    /// Weak reversion with three times the daily noise
    Volatile,
    /// Mean-reverting, with dates missing from each leg
    WithGaps,
}

impl MarketScenario {
    pub fn all() -> [MarketScenario; 5] {
        [
            MarketScenario::MeanReverting,
            MarketScenario::Trending,
            MarketScenario::RegimeShift,
            MarketScenario::Volatile,
            MarketScenario::WithGaps,
        ]
    }
}

/// Generates synthetic USD/MYR and USD/SGD histories for backtesting
pub struct SyntheticPairGenerator {
    rng: StdRng,
    start_date: NaiveDate,
    base_sgd: f64,
    base_cross: f64,
}

impl SyntheticPairGenerator {
    /// Create a new generator with a seed for reproducibility
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            start_date: NaiveDate::from_ymd_opt(2021, 3, 1).unwrap_or_default(),
            base_sgd: 1.35,  // USD/SGD
            base_cross: 3.1, // MYR per SGD
        }
    }

    /// Generate a pair of legs for a specific market scenario
    ///
    /// # Arguments
    /// * `scenario` - The market scenario to simulate
    /// * `num_days` - Number of business days to generate
    ///
    /// # Returns
    /// (USD_MYR, USD_SGD) price series; the MYR leg is the cross rate times SGD
    pub fn generate(&mut self, scenario: MarketScenario, num_days: usize) -> (PriceSeries, PriceSeries) {
        let dates = business_days(self.start_date, num_days);
        let mean = self.base_cross.ln();

        let spread = match scenario {
            MarketScenario::MeanReverting | MarketScenario::WithGaps => {
                self.ou_path(num_days, |_| mean, 0.10, 0.002)
            }
            MarketScenario::Trending => self.trend_path(num_days, mean, 0.0004, 0.002),
            MarketScenario::RegimeShift => {
                let half = num_days / 2;
                self.ou_path(num_days, |i| if i < half { mean } else { mean + 0.05 }, 0.10, 0.002)
            }
            MarketScenario::Volatile => self.ou_path(num_days, |_| mean, 0.05, 0.006),
        };

        // USD/SGD random walk, the common dollar factor of both legs
        let mut log_sgd = self.base_sgd.ln();
        let mut myr_points = Vec::with_capacity(num_days);
        let mut sgd_points = Vec::with_capacity(num_days);

        for (i, (&date, &s)) in dates.iter().zip(&spread).enumerate() {
            log_sgd += 0.003 * self.standard_normal();

            let keep_myr = scenario != MarketScenario::WithGaps || i % 17 != 16;
            let keep_sgd = scenario != MarketScenario::WithGaps || i % 23 != 22;

            if keep_myr {
                myr_points.push(PricePoint::new(date, (log_sgd + s).exp()));
            }
            if keep_sgd {
                sgd_points.push(PricePoint::new(date, log_sgd.exp()));
            }
        }

        (
            PriceSeries::from_valid_points("USD_MYR", myr_points),
            PriceSeries::from_valid_points("USD_SGD", sgd_points),
        )
    }

    /// Ornstein-Uhlenbeck path with a time-varying mean
    fn ou_path(&mut self, n: usize, mean_at: impl Fn(usize) -> f64, theta: f64, sigma: f64) -> Vec<f64> {
        let mut path = Vec::with_capacity(n);
        let mut current = mean_at(0);

        for i in 0..n {
            current += theta * (mean_at(i) - current) + sigma * self.standard_normal();
            path.push(current);
        }

        path
    }

    fn trend_path(&mut self, n: usize, start: f64, drift: f64, sigma: f64) -> Vec<f64> {
        let mut path = Vec::with_capacity(n);
        let mut current = start;

        for _ in 0..n {
            current += drift + sigma * self.standard_normal();
            path.push(current);
        }

        path
    }

    fn standard_normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }
}

/// `count` consecutive weekdays starting at `start` (rolled forward off weekends)
fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(count);
    let mut date = start;

    while dates.len() < count {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date += Duration::days(1);
    }

    dates
}
