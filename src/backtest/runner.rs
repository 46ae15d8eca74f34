use serde::Serialize;

use crate::backtest::metrics::PerformanceMetrics;
use crate::backtest::simulator::{PositionSimulator, SimulationResult};
use crate::models::{PriceSeries, SignalState, Spread};
use crate::strategy::{build_spread, Parameters, SignalGenerator};
use crate::Result;

/// Everything produced by one pass of the pipeline over one window
#[derive(Debug, Clone, Serialize)]
pub struct BacktestRun {
    pub parameters: Parameters,
    pub spread: Spread,
    pub signals: Vec<SignalState>,
    pub simulation: SimulationResult,
    pub metrics: PerformanceMetrics,
}

/// Runs spread -> signals -> positions -> metrics for one parameter set
///
/// Holds nothing but its parameters; every call rebuilds all derived series
/// from the prices it is given.
#[derive(Debug, Clone)]
pub struct BacktestRunner {
    params: Parameters,
}

impl BacktestRunner {
    /// Create a runner, rejecting invalid parameters up front
    pub fn new(params: Parameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Run a backtest over two aligned-or-not price legs
    ///
    /// # Arguments
    /// * `leg_a` - Numerator leg (e.g. USD/MYR)
    /// * `leg_b` - Denominator leg (e.g. USD/SGD)
    ///
    /// # Returns
    /// BacktestRun with the spread, signals, simulation and metrics
    pub fn run(&self, leg_a: &PriceSeries, leg_b: &PriceSeries) -> Result<BacktestRun> {
        let spread = build_spread(leg_a, leg_b, self.params.spread_kind)?;
        self.run_on_spread(spread)
    }

    /// Run the signal/simulation/metrics stages on a prebuilt spread
    pub fn run_on_spread(&self, spread: Spread) -> Result<BacktestRun> {
        let generator = SignalGenerator::new(self.params)?;
        let signals = generator.generate(&spread)?;

        let simulation = PositionSimulator::new(self.params).simulate(&signals);
        let metrics = PerformanceMetrics::calculate(
            &simulation.period_returns,
            &simulation.trades,
            self.params.periods_per_year,
        );

        tracing::debug!(
            "Backtest {}: {} dates, {} trades, sharpe {:.3}",
            self.params.label(),
            spread.len(),
            metrics.num_trades,
            metrics.sharpe_ratio
        );

        Ok(BacktestRun {
            parameters: self.params,
            spread,
            signals,
            simulation,
            metrics,
        })
    }

    /// Run backtest and print report
    pub fn run_and_report(
        &self,
        leg_a: &PriceSeries,
        leg_b: &PriceSeries,
        period_name: &str,
    ) -> Result<BacktestRun> {
        println!("\n🔬 Running backtest: {}", period_name);
        println!("   Pair: {}/{}", leg_a.name(), leg_b.name());
        println!("   Parameters: {}", self.params.label());

        let run = self.run(leg_a, leg_b)?;
        if let (Some(first), Some(last)) = (run.spread.points.first(), run.spread.points.last()) {
            println!(
                "   Period: {} to {} ({} aligned dates)",
                first.date,
                last.date,
                run.spread.len()
            );
        }
        run.metrics.print_report(period_name);

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{MarketScenario, SyntheticPairGenerator};
    use crate::error::BacktestError;
    use crate::models::Position;

    #[test]
    fn test_backtest_mean_reverting_pair() {
        tracing_subscriber::fmt()
            .with_env_filter("fxpairs=debug")
            .try_init()
            .ok();

        let mut gen = SyntheticPairGenerator::new(42);
        let (myr, sgd) = gen.generate(MarketScenario::MeanReverting, 500);

        let runner = BacktestRunner::new(Parameters::new(30, 1.5, 0.25, 4.0, 2.0)).unwrap();
        let run = runner.run(&myr, &sgd).unwrap();

        assert_eq!(run.spread.len(), 500);
        assert_eq!(run.signals.len(), 500);
        assert_eq!(run.simulation.equity_curve.len(), 500);
        assert_eq!(run.simulation.period_returns.len(), 499);
        assert_eq!(run.simulation.equity_curve[0].equity, 1.0);

        // A strongly mean-reverting spread should produce round trips
        assert!(run.metrics.num_trades > 0);
        assert!(run.simulation.equity_curve.iter().all(|p| p.equity > 0.0));
        assert!(run.metrics.max_drawdown <= 0.0);
    }

    #[test]
    fn test_backtest_is_reproducible() {
        let mut gen = SyntheticPairGenerator::new(7);
        let (myr, sgd) = gen.generate(MarketScenario::Volatile, 300);

        let runner = BacktestRunner::new(Parameters::new(20, 2.0, 0.5, 3.5, 5.0)).unwrap();
        let first = runner.run(&myr, &sgd).unwrap();
        let second = runner.run(&myr, &sgd).unwrap();

        assert_eq!(first.metrics, second.metrics);
        assert_eq!(first.simulation.trades, second.simulation.trades);
    }

    #[test]
    fn test_backtest_insufficient_data() {
        let mut gen = SyntheticPairGenerator::new(42);
        let (myr, sgd) = gen.generate(MarketScenario::MeanReverting, 50);

        let runner = BacktestRunner::new(Parameters::new(60, 2.0, 0.5, 4.0, 2.0)).unwrap();
        let result = runner.run(&myr, &sgd);

        assert!(matches!(
            result,
            Err(BacktestError::InsufficientData {
                available: 50,
                required: 61
            })
        ));
    }

    #[test]
    fn test_positions_only_change_through_flat() {
        let mut gen = SyntheticPairGenerator::new(11);
        let (myr, sgd) = gen.generate(MarketScenario::RegimeShift, 600);

        let runner = BacktestRunner::new(Parameters::new(15, 1.0, 0.0, 2.5, 0.0)).unwrap();
        let run = runner.run(&myr, &sgd).unwrap();

        for pair in run.simulation.positions.windows(2) {
            let flip = matches!(
                (pair[0], pair[1]),
                (Position::Long, Position::Short) | (Position::Short, Position::Long)
            );
            assert!(!flip, "direct flip {:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let result = BacktestRunner::new(Parameters::new(20, 2.0, 0.5, 1.0, 2.0));
        assert!(result.is_err());
    }
}
