// Core modules
pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod models;
pub mod strategy;

// Re-export commonly used types
pub use backtest::{BacktestRunner, GridSearchOptimizer, ParameterGrid, PerformanceMetrics, SplitPoint};
pub use error::BacktestError;
pub use models::*;
pub use strategy::Parameters;

// Error handling
pub type Result<T> = std::result::Result<T, BacktestError>;
