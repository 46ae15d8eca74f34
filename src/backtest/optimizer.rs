use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::metrics::PerformanceMetrics;
use crate::backtest::runner::BacktestRunner;
use crate::backtest::simulator::EquityPoint;
use crate::error::BacktestError;
use crate::models::{PriceSeries, SpreadKind, Trade};
use crate::strategy::{common_dates, Parameters, WindowMode, MIN_ALIGNED_POINTS};
use crate::Result;

/// Candidate values for each tunable parameter
///
/// The sweep is the cartesian product of the five axes, enumerated with the
/// lookback window outermost and the cost innermost. The remaining fields are
/// fixed for every candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParameterGrid {
    pub lookback_windows: Vec<usize>,
    pub entry_thresholds: Vec<f64>,
    pub exit_thresholds: Vec<f64>,
    pub stop_loss_thresholds: Vec<f64>,
    pub transaction_costs_bps: Vec<f64>,
    pub periods_per_year: f64,
    pub window_mode: WindowMode,
    pub spread_kind: SpreadKind,
}

impl Default for ParameterGrid {
    fn default() -> Self {
        Self {
            lookback_windows: vec![30, 60, 90, 120],
            entry_thresholds: vec![1.5, 1.75, 2.0, 2.25],
            exit_thresholds: vec![0.0, 0.25, 0.5, 0.75],
            stop_loss_thresholds: vec![4.0],
            transaction_costs_bps: vec![2.0],
            periods_per_year: 252.0,
            window_mode: WindowMode::default(),
            spread_kind: SpreadKind::default(),
        }
    }
}

impl ParameterGrid {
    /// Grid holding exactly one candidate
    pub fn single(params: Parameters) -> Self {
        Self {
            lookback_windows: vec![params.lookback_window],
            entry_thresholds: vec![params.entry_threshold],
            exit_thresholds: vec![params.exit_threshold],
            stop_loss_thresholds: vec![params.stop_loss_threshold],
            transaction_costs_bps: vec![params.transaction_cost_bps],
            periods_per_year: params.periods_per_year,
            window_mode: params.window_mode,
            spread_kind: params.spread_kind,
        }
    }

    /// Number of candidates the grid expands to
    pub fn len(&self) -> usize {
        self.lookback_windows.len()
            * self.entry_thresholds.len()
            * self.exit_thresholds.len()
            * self.stop_loss_thresholds.len()
            * self.transaction_costs_bps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand the grid into its candidate parameter sets
    ///
    /// Individual candidates are not validated here; an inconsistent
    /// combination (e.g. stop below entry) fails as its own trial.
    pub fn candidates(&self) -> Result<Vec<Parameters>> {
        let axes = [
            ("lookback_windows", self.lookback_windows.is_empty()),
            ("entry_thresholds", self.entry_thresholds.is_empty()),
            ("exit_thresholds", self.exit_thresholds.is_empty()),
            ("stop_loss_thresholds", self.stop_loss_thresholds.is_empty()),
            ("transaction_costs_bps", self.transaction_costs_bps.is_empty()),
        ];
        if let Some((name, _)) = axes.iter().find(|(_, empty)| *empty) {
            return Err(BacktestError::malformed_grid(format!("axis `{}` is empty", name)));
        }
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(BacktestError::malformed_grid(format!(
                "periods_per_year must be positive, got {}",
                self.periods_per_year
            )));
        }

        let mut candidates = Vec::with_capacity(self.len());
        for &lookback in &self.lookback_windows {
            for &entry in &self.entry_thresholds {
                for &exit in &self.exit_thresholds {
                    for &stop in &self.stop_loss_thresholds {
                        for &cost in &self.transaction_costs_bps {
                            candidates.push(
                                Parameters::new(lookback, entry, exit, stop, cost)
                                    .with_periods_per_year(self.periods_per_year)
                                    .with_window_mode(self.window_mode)
                                    .with_spread_kind(self.spread_kind),
                            );
                        }
                    }
                }
            }
        }

        Ok(candidates)
    }
}

/// Where the in-sample window ends and the out-of-sample window begins
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum SplitPoint {
    /// First out-of-sample date
    Date(NaiveDate),
    /// Share of the common dates that goes in-sample (0..1)
    Fraction(f64),
}

impl SplitPoint {
    /// Resolve to the first out-of-sample date and check both sides are usable
    pub fn resolve(&self, a: &PriceSeries, b: &PriceSeries) -> Result<NaiveDate> {
        let dates = common_dates(a, b);

        let split_date = match *self {
            SplitPoint::Date(date) => date,
            SplitPoint::Fraction(fraction) => {
                if !(fraction > 0.0 && fraction < 1.0) {
                    return Err(BacktestError::invalid_split(format!(
                        "fraction must be inside (0, 1), got {}",
                        fraction
                    )));
                }
                let index = (fraction * dates.len() as f64).floor() as usize;
                *dates.get(index).ok_or_else(|| {
                    BacktestError::invalid_split(format!(
                        "fraction {} leaves no out-of-sample dates",
                        fraction
                    ))
                })?
            }
        };

        let in_sample = dates.iter().filter(|d| **d < split_date).count();
        let out_of_sample = dates.len() - in_sample;
        if in_sample < MIN_ALIGNED_POINTS || out_of_sample < MIN_ALIGNED_POINTS {
            return Err(BacktestError::invalid_split(format!(
                "split at {} leaves {} in-sample and {} out-of-sample common dates",
                split_date, in_sample, out_of_sample
            )));
        }

        Ok(split_date)
    }
}

/// Metric used to rank candidates in-sample
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    #[default]
    Sharpe,
    Sortino,
    AnnualizedReturn,
    TotalReturn,
    Calmar,
}

impl Objective {
    pub fn score(&self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            Objective::Sharpe => metrics.sharpe_ratio,
            Objective::Sortino => metrics.sortino_ratio,
            Objective::AnnualizedReturn => metrics.annualized_return,
            Objective::TotalReturn => metrics.total_return,
            Objective::Calmar => metrics.calmar_ratio,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Objective::Sharpe => "sharpe",
            Objective::Sortino => "sortino",
            Objective::AnnualizedReturn => "annualized_return",
            Objective::TotalReturn => "total_return",
            Objective::Calmar => "calmar",
        };
        f.write_str(name)
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "sharpe" => Ok(Objective::Sharpe),
            "sortino" => Ok(Objective::Sortino),
            "annualized_return" | "cagr" => Ok(Objective::AnnualizedReturn),
            "total_return" => Ok(Objective::TotalReturn),
            "calmar" => Ok(Objective::Calmar),
            other => Err(format!("unknown objective `{}`", other)),
        }
    }
}

/// Limits on how much of the grid a sweep may evaluate
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SweepBudget {
    /// Only the first `max_trials` candidates (in grid order) are run
    pub max_trials: Option<usize>,
    /// No new trial starts once this much time has passed
    pub time_limit: Option<Duration>,
}

/// Which window a trial failed in
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrialPhase {
    InSample,
    OutOfSample,
}

/// A candidate that could not be evaluated
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedTrial {
    pub parameters: Parameters,
    pub phase: TrialPhase,
    pub error: BacktestError,
}

/// In-sample outcome of one candidate, in ranking order
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RankedTrial {
    /// 1-based
    pub rank: usize,
    pub parameters: Parameters,
    pub score: f64,
    pub metrics: PerformanceMetrics,
}

/// Reported result for a selected candidate
///
/// Trades and equity come from the out-of-sample run, which uses the
/// in-sample parameters unchanged.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BacktestResult {
    pub parameters: Parameters,
    pub rank: usize,
    pub in_sample_score: f64,
    pub out_of_sample_score: f64,
    pub in_sample_metrics: PerformanceMetrics,
    pub out_of_sample_metrics: PerformanceMetrics,
    pub trade_log: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

/// Everything a sweep produced, including what it skipped
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GridSearchReport {
    pub objective: Objective,
    pub split_date: NaiveDate,
    pub total_candidates: usize,
    pub evaluated: usize,
    pub stopped_early: bool,
    pub ranked: Vec<RankedTrial>,
    pub failed: Vec<FailedTrial>,
    pub selected: Vec<BacktestResult>,
}

impl GridSearchReport {
    /// Top selected candidate, if any survived both windows
    pub fn best(&self) -> Option<&BacktestResult> {
        self.selected.first()
    }

    /// Print a ranking table in the style of the metric reports
    pub fn print_summary(&self, top: usize) {
        println!("\n╔═══════════════════════════════════════════════════════╗");
        println!("║ {:^53} ║", format!("TOP {} BY IN-SAMPLE {}", top, self.objective).to_uppercase());
        println!("╚═══════════════════════════════════════════════════════╝\n");

        println!(
            "  Split date: {} | Candidates: {} | Evaluated: {} | Failed: {}{}",
            self.split_date,
            self.total_candidates,
            self.evaluated,
            self.failed.len(),
            if self.stopped_early { " | stopped early" } else { "" }
        );
        println!();

        for trial in self.ranked.iter().take(top) {
            println!("#{} {}: {:.3}", trial.rank, self.objective, trial.score);
            println!("   {}", trial.parameters.label());
            println!(
                "   Return: {:+.2}% | Trades: {} | Win Rate: {:.1}% | Max DD: {:.2}%",
                trial.metrics.total_return * 100.0,
                trial.metrics.num_trades,
                trial.metrics.win_rate * 100.0,
                trial.metrics.max_drawdown * 100.0
            );
        }
    }
}

enum TrialOutcome {
    Scored(Parameters, PerformanceMetrics),
    Failed(FailedTrial),
}

/// In-sample grid search with out-of-sample confirmation
///
/// Every candidate runs the full pipeline on the in-sample window only. The
/// best `top_k` by the objective (ties broken by [`Parameters::tie_break_cmp`])
/// are then rerun, unchanged, on the out-of-sample window.
#[derive(Debug, Clone)]
pub struct GridSearchOptimizer {
    grid: ParameterGrid,
    split: SplitPoint,
    objective: Objective,
    top_k: usize,
    budget: SweepBudget,
    parallel: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl GridSearchOptimizer {
    pub fn new(grid: ParameterGrid, split: SplitPoint) -> Self {
        Self {
            grid,
            split,
            objective: Objective::default(),
            top_k: 1,
            budget: SweepBudget::default(),
            parallel: true,
            cancel: None,
        }
    }

    pub fn with_objective(mut self, objective: Objective) -> Self {
        self.objective = objective;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_budget(mut self, budget: SweepBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Run trials on the rayon pool (`true`, the default) or one at a time
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Flag checked before each trial; setting it stops the sweep
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn grid(&self) -> &ParameterGrid {
        &self.grid
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Run the sweep over the two legs
    ///
    /// Only a malformed grid or an unusable split is returned as an error;
    /// per-candidate failures are listed in the report.
    pub fn run(&self, leg_a: &PriceSeries, leg_b: &PriceSeries) -> Result<GridSearchReport> {
        let mut candidates = self.grid.candidates()?;
        let split_date = self.split.resolve(leg_a, leg_b)?;

        let in_sample = (
            leg_a.between(None, Some(split_date)),
            leg_b.between(None, Some(split_date)),
        );
        let out_of_sample = (
            leg_a.between(Some(split_date), None),
            leg_b.between(Some(split_date), None),
        );

        let total_candidates = candidates.len();
        let mut stopped_early = false;
        if let Some(max_trials) = self.budget.max_trials {
            if max_trials < candidates.len() {
                candidates.truncate(max_trials);
                stopped_early = true;
            }
        }

        tracing::info!(
            "Grid search: {} candidates ({} scheduled), objective {}, split at {}, top {}",
            total_candidates,
            candidates.len(),
            self.objective,
            split_date,
            self.top_k
        );

        let deadline = self.budget.time_limit.map(|limit| Instant::now() + limit);
        let completed = AtomicUsize::new(0);
        let scheduled = candidates.len();

        let evaluate = |params: &Parameters| -> Option<Result<TrialOutcome>> {
            if self.should_stop(deadline) {
                return None;
            }
            let outcome = self.evaluate_in_sample(*params, &in_sample.0, &in_sample.1);

            let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
            if done % 50 == 0 || done == scheduled {
                tracing::info!("Completed {}/{} trials", done, scheduled);
            }
            Some(outcome)
        };

        let outcomes: Vec<Option<Result<TrialOutcome>>> = if self.parallel {
            candidates.par_iter().map(evaluate).collect()
        } else {
            let mut outcomes = Vec::with_capacity(scheduled);
            for params in &candidates {
                let outcome = evaluate(params);
                let skipped = outcome.is_none();
                outcomes.push(outcome);
                if skipped {
                    break;
                }
            }
            outcomes
        };

        let evaluated = outcomes.iter().filter(|o| o.is_some()).count();
        if evaluated < scheduled {
            stopped_early = true;
            tracing::info!("Sweep stopped early after {} of {} trials", evaluated, scheduled);
        }

        let mut scored = Vec::new();
        let mut failed = Vec::new();
        for outcome in outcomes.into_iter().flatten() {
            match outcome? {
                TrialOutcome::Scored(params, metrics) => scored.push((params, metrics)),
                TrialOutcome::Failed(trial) => failed.push(trial),
            }
        }

        let ranked = self.rank(scored);
        let selected =
            self.confirm_out_of_sample(&ranked, &out_of_sample.0, &out_of_sample.1, &mut failed)?;

        if let Some(best) = selected.first() {
            tracing::info!(
                "Selected {}: in-sample {} {:.3}, out-of-sample {:.3}",
                best.parameters.label(),
                self.objective,
                best.in_sample_score,
                best.out_of_sample_score
            );
        } else {
            tracing::warn!("No candidate survived the sweep");
        }

        Ok(GridSearchReport {
            objective: self.objective,
            split_date,
            total_candidates,
            evaluated,
            stopped_early,
            ranked,
            failed,
            selected,
        })
    }

    fn should_stop(&self, deadline: Option<Instant>) -> bool {
        let cancelled = self
            .cancel
            .as_ref()
            .map_or(false, |flag| flag.load(Ordering::Relaxed));
        let expired = deadline.map_or(false, |d| Instant::now() >= d);
        cancelled || expired
    }

    fn evaluate_in_sample(
        &self,
        params: Parameters,
        a: &PriceSeries,
        b: &PriceSeries,
    ) -> Result<TrialOutcome> {
        match BacktestRunner::new(params).and_then(|runner| runner.run(a, b)) {
            Ok(run) => Ok(TrialOutcome::Scored(params, run.metrics)),
            Err(error) => record_failure(params, TrialPhase::InSample, error).map(TrialOutcome::Failed),
        }
    }

    /// Sort by score descending, then by the parameter tie-break order
    fn rank(&self, scored: Vec<(Parameters, PerformanceMetrics)>) -> Vec<RankedTrial> {
        let mut trials: Vec<(Parameters, f64, PerformanceMetrics)> = scored
            .into_iter()
            .map(|(params, metrics)| (params, self.objective.score(&metrics), metrics))
            .collect();

        trials.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.tie_break_cmp(&b.0)));

        trials
            .into_iter()
            .enumerate()
            .map(|(i, (parameters, score, metrics))| RankedTrial {
                rank: i + 1,
                parameters,
                score,
                metrics,
            })
            .collect()
    }

    fn confirm_out_of_sample(
        &self,
        ranked: &[RankedTrial],
        a: &PriceSeries,
        b: &PriceSeries,
        failed: &mut Vec<FailedTrial>,
    ) -> Result<Vec<BacktestResult>> {
        let mut selected = Vec::with_capacity(self.top_k);

        for trial in ranked.iter().take(self.top_k) {
            match BacktestRunner::new(trial.parameters).and_then(|runner| runner.run(a, b)) {
                Ok(run) => selected.push(BacktestResult {
                    parameters: trial.parameters,
                    rank: trial.rank,
                    in_sample_score: trial.score,
                    out_of_sample_score: self.objective.score(&run.metrics),
                    in_sample_metrics: trial.metrics.clone(),
                    out_of_sample_metrics: run.metrics,
                    trade_log: run.simulation.trades,
                    equity_curve: run.simulation.equity_curve,
                }),
                Err(error) => {
                    failed.push(record_failure(trial.parameters, TrialPhase::OutOfSample, error)?);
                }
            }
        }

        Ok(selected)
    }
}

/// Turn a trial error into a report entry, or abort the sweep if it is fatal
fn record_failure(parameters: Parameters, phase: TrialPhase, error: BacktestError) -> Result<FailedTrial> {
    if !error.is_recoverable() {
        tracing::error!("Trial {} hit a fatal error: {}", parameters.label(), error);
        return Err(error);
    }

    tracing::warn!("Trial {} failed ({:?}): {}", parameters.label(), phase, error);
    Ok(FailedTrial {
        parameters,
        phase,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backtest::synthetic::{MarketScenario, SyntheticPairGenerator};
    use crate::models::PricePoint;

    fn legs(seed: u64, days: usize) -> (PriceSeries, PriceSeries) {
        SyntheticPairGenerator::new(seed).generate(MarketScenario::MeanReverting, days)
    }

    fn small_grid() -> ParameterGrid {
        ParameterGrid {
            lookback_windows: vec![20, 40],
            entry_thresholds: vec![1.5, 2.0],
            exit_thresholds: vec![0.0, 0.5],
            stop_loss_thresholds: vec![4.0],
            transaction_costs_bps: vec![2.0],
            ..ParameterGrid::default()
        }
    }

    #[test]
    fn test_default_grid_size() {
        let grid = ParameterGrid::default();
        assert_eq!(grid.len(), 64);
        assert_eq!(grid.candidates().unwrap().len(), 64);
    }

    #[test]
    fn test_candidates_nesting_order() {
        let candidates = small_grid().candidates().unwrap();

        assert_eq!(candidates.len(), 8);
        assert_eq!(candidates[0], Parameters::new(20, 1.5, 0.0, 4.0, 2.0));
        assert_eq!(candidates[1], Parameters::new(20, 1.5, 0.5, 4.0, 2.0));
        assert_eq!(candidates[7], Parameters::new(40, 2.0, 0.5, 4.0, 2.0));
    }

    #[test]
    fn test_empty_axis_is_fatal() {
        let grid = ParameterGrid {
            exit_thresholds: vec![],
            ..small_grid()
        };
        let (a, b) = legs(1, 300);

        let err = GridSearchOptimizer::new(grid, SplitPoint::Fraction(0.7))
            .run(&a, &b)
            .unwrap_err();
        assert!(matches!(err, BacktestError::MalformedGrid { .. }));
        assert!(err.to_string().contains("exit_thresholds"));
    }

    #[test]
    fn test_split_resolution() {
        let (a, b) = legs(1, 100);
        let dates = common_dates(&a, &b);

        let split = SplitPoint::Fraction(0.7).resolve(&a, &b).unwrap();
        assert_eq!(split, dates[70]);

        let split = SplitPoint::Date(dates[10]).resolve(&a, &b).unwrap();
        assert_eq!(split, dates[10]);
    }

    #[test]
    fn test_unusable_split_is_fatal() {
        let (a, b) = legs(1, 100);
        let dates = common_dates(&a, &b);

        assert!(matches!(
            SplitPoint::Fraction(1.0).resolve(&a, &b),
            Err(BacktestError::InvalidSplit { .. })
        ));
        assert!(matches!(
            SplitPoint::Date(dates[1]).resolve(&a, &b),
            Err(BacktestError::InvalidSplit { .. })
        ));
        assert!(matches!(
            SplitPoint::Date(dates[99]).resolve(&a, &b),
            Err(BacktestError::InvalidSplit { .. })
        ));
    }

    #[test]
    fn test_sweep_is_deterministic() {
        let (a, b) = legs(42, 600);
        let optimizer = GridSearchOptimizer::new(small_grid(), SplitPoint::Fraction(0.7)).with_top_k(3);

        let first = optimizer.run(&a, &b).unwrap();
        let second = optimizer.run(&a, &b).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.evaluated, 8);
        assert!(!first.stopped_early);
        assert_eq!(first.selected.len(), 3);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let (a, b) = legs(3, 500);
        let optimizer = GridSearchOptimizer::new(small_grid(), SplitPoint::Fraction(0.6)).with_top_k(2);

        let parallel = optimizer.clone().with_parallelism(true).run(&a, &b).unwrap();
        let sequential = optimizer.with_parallelism(false).run(&a, &b).unwrap();

        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_ranking_is_ordered() {
        let (a, b) = legs(9, 500);
        let report = GridSearchOptimizer::new(small_grid(), SplitPoint::Fraction(0.7))
            .with_objective(Objective::Sortino)
            .run(&a, &b)
            .unwrap();

        for pair in report.ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].parameters.tie_break_cmp(&pair[1].parameters).is_lt());
            }
        }
        let best = report.best().unwrap();
        assert_eq!(best.rank, 1);
        assert_eq!(best.parameters, report.ranked[0].parameters);
        assert_eq!(best.in_sample_score, report.ranked[0].metrics.sortino_ratio);
    }

    #[test]
    fn test_single_candidate_matches_plain_run() {
        let (a, b) = legs(21, 400);
        let params = Parameters::new(25, 1.75, 0.25, 4.0, 2.0);
        let split = SplitPoint::Fraction(0.5);
        let split_date = split.resolve(&a, &b).unwrap();

        let report = GridSearchOptimizer::new(ParameterGrid::single(params), split)
            .run(&a, &b)
            .unwrap();

        let runner = BacktestRunner::new(params).unwrap();
        let in_sample = runner
            .run(&a.between(None, Some(split_date)), &b.between(None, Some(split_date)))
            .unwrap();
        let out_of_sample = runner
            .run(&a.between(Some(split_date), None), &b.between(Some(split_date), None))
            .unwrap();

        let best = report.best().unwrap();
        assert_eq!(best.in_sample_metrics, in_sample.metrics);
        assert_eq!(best.out_of_sample_metrics, out_of_sample.metrics);
        assert_eq!(best.trade_log, out_of_sample.simulation.trades);
        assert_eq!(best.equity_curve, out_of_sample.simulation.equity_curve);
    }

    #[test]
    fn test_out_of_sample_prices_do_not_affect_selection() {
        let (a, b) = legs(8, 600);
        let split_date = SplitPoint::Fraction(0.6).resolve(&a, &b).unwrap();

        // Distort everything from the split date onwards
        let distorted: Vec<PricePoint> = a
            .points()
            .iter()
            .enumerate()
            .map(|(i, p)| {
                if p.date >= split_date {
                    PricePoint::new(p.date, p.value * (1.0 + 0.01 * ((i % 7) as f64 - 3.0)))
                } else {
                    *p
                }
            })
            .collect();
        let a_distorted = PriceSeries::new(a.name(), distorted).unwrap();

        let optimizer = GridSearchOptimizer::new(small_grid(), SplitPoint::Date(split_date));
        let original = optimizer.run(&a, &b).unwrap();
        let perturbed = optimizer.run(&a_distorted, &b).unwrap();

        assert_eq!(original.ranked, perturbed.ranked);
        assert_eq!(
            original.best().unwrap().parameters,
            perturbed.best().unwrap().parameters
        );
        assert_ne!(
            original.best().unwrap().out_of_sample_metrics,
            perturbed.best().unwrap().out_of_sample_metrics
        );
    }

    #[test]
    fn test_failed_trials_are_recorded() {
        let grid = ParameterGrid {
            lookback_windows: vec![20, 500],
            entry_thresholds: vec![2.0, 5.0],
            exit_thresholds: vec![0.5],
            stop_loss_thresholds: vec![4.0],
            transaction_costs_bps: vec![2.0],
            ..ParameterGrid::default()
        };
        let (a, b) = legs(4, 400);

        let report = GridSearchOptimizer::new(grid, SplitPoint::Fraction(0.7))
            .run(&a, &b)
            .unwrap();

        // Only (20, 2.0) is valid and fits in the in-sample window
        assert_eq!(report.evaluated, 4);
        assert_eq!(report.ranked.len(), 1);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failed.iter().all(|f| f.phase == TrialPhase::InSample));
        assert!(report
            .failed
            .iter()
            .any(|f| matches!(f.error, BacktestError::InsufficientData { .. })));
        assert!(report
            .failed
            .iter()
            .any(|f| matches!(f.error, BacktestError::InvalidParameter { .. })));
    }

    #[test]
    fn test_out_of_sample_failure_is_recorded() {
        let (a, b) = legs(4, 400);
        // In-sample window of 300 dates fits lookback 150; the last 100 do not
        let params = Parameters::new(150, 2.0, 0.5, 4.0, 2.0);

        let report = GridSearchOptimizer::new(ParameterGrid::single(params), SplitPoint::Fraction(0.75))
            .run(&a, &b)
            .unwrap();

        assert_eq!(report.ranked.len(), 1);
        assert!(report.selected.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].phase, TrialPhase::OutOfSample);
    }

    #[test]
    fn test_max_trials_budget() {
        let (a, b) = legs(5, 400);
        let report = GridSearchOptimizer::new(small_grid(), SplitPoint::Fraction(0.7))
            .with_budget(SweepBudget {
                max_trials: Some(3),
                time_limit: None,
            })
            .run(&a, &b)
            .unwrap();

        assert_eq!(report.total_candidates, 8);
        assert_eq!(report.evaluated, 3);
        assert!(report.stopped_early);
        assert_eq!(report.ranked.len(), 3);
    }

    #[test]
    fn test_expired_time_limit_runs_nothing() {
        let (a, b) = legs(5, 400);
        let report = GridSearchOptimizer::new(small_grid(), SplitPoint::Fraction(0.7))
            .with_budget(SweepBudget {
                max_trials: None,
                time_limit: Some(Duration::ZERO),
            })
            .with_parallelism(false)
            .run(&a, &b)
            .unwrap();

        assert_eq!(report.evaluated, 0);
        assert!(report.stopped_early);
        assert!(report.best().is_none());
    }

    #[test]
    fn test_cancel_flag_stops_sweep() {
        let (a, b) = legs(5, 400);
        let cancel = Arc::new(AtomicBool::new(true));

        let report = GridSearchOptimizer::new(small_grid(), SplitPoint::Fraction(0.7))
            .with_cancel_flag(cancel)
            .run(&a, &b)
            .unwrap();

        assert_eq!(report.evaluated, 0);
        assert!(report.stopped_early);
        assert!(report.ranked.is_empty());
        assert!(report.selected.is_empty());
    }

    #[test]
    fn test_only_recoverable_errors_become_failed_trials() {
        let params = Parameters::new(20, 1.5, 0.0, 4.0, 2.0);

        let trial = record_failure(
            params,
            TrialPhase::InSample,
            BacktestError::InsufficientData {
                available: 10,
                required: 21,
            },
        )
        .unwrap();
        assert_eq!(trial.phase, TrialPhase::InSample);
        assert_eq!(trial.parameters, params);

        let fatal = record_failure(
            params,
            TrialPhase::OutOfSample,
            BacktestError::malformed_grid("axis `lookback_windows` is empty"),
        );
        assert!(matches!(fatal, Err(BacktestError::MalformedGrid { .. })));

        let fatal = record_failure(params, TrialPhase::InSample, BacktestError::invalid_split("no dates"));
        assert!(matches!(fatal, Err(BacktestError::InvalidSplit { .. })));
    }

    #[test]
    fn test_objective_parsing() {
        assert_eq!("sharpe".parse::<Objective>(), Ok(Objective::Sharpe));
        assert_eq!("Annualized-Return".parse::<Objective>(), Ok(Objective::AnnualizedReturn));
        assert!("alpha".parse::<Objective>().is_err());
        assert_eq!(Objective::Calmar.to_string(), "calmar");
    }
}
