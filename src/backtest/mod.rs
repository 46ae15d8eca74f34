pub mod metrics;
pub mod optimizer;
pub mod runner;
pub mod simulator;
pub mod synthetic;

pub use metrics::PerformanceMetrics;
pub use optimizer::{
    BacktestResult, FailedTrial, GridSearchOptimizer, GridSearchReport, Objective, ParameterGrid,
    RankedTrial, SplitPoint, SweepBudget, TrialPhase,
};
pub use runner::{BacktestRun, BacktestRunner};
pub use simulator::{EquityPoint, PositionSimulator, SimulationResult};
pub use synthetic::{MarketScenario, SyntheticPairGenerator};
