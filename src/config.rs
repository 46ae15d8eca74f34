//! Application configuration
//!
//! A TOML file provides the defaults for every CLI run; any field can be
//! overridden from the environment with `FXPAIRS__<SECTION>__<FIELD>`, e.g.
//! `FXPAIRS__OPTIMIZER__TOP_K=3`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use chrono::NaiveDate;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::backtest::{Objective, ParameterGrid, SplitPoint, SweepBudget};
use crate::models::PriceSeries;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub data: DataConfig,
    pub grid: ParameterGrid,
    pub split: SplitConfig,
    pub optimizer: OptimizerConfig,
    pub logging: LoggingConfig,
}

/// Where the two legs are read from
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Ringgit per US dollar (FRED DEXMAUS)
    pub myr_path: PathBuf,
    pub myr_column: String,
    /// Singapore dollars per US dollar (FRED DEXSIUS)
    pub sgd_path: PathBuf,
    pub sgd_column: String,
    /// Window applied to both legs before anything else
    pub start_date: Option<NaiveDate>,
    /// Last date kept (inclusive)
    pub end_date: Option<NaiveDate>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            myr_path: PathBuf::from("data/DEXMAUS.csv"),
            myr_column: "DEXMAUS".to_string(),
            sgd_path: PathBuf::from("data/DEXSIUS.csv"),
            sgd_column: "DEXSIUS".to_string(),
            start_date: NaiveDate::from_ymd_opt(2021, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2025, 11, 28),
        }
    }
}

impl DataConfig {
    /// Keep the points from `start_date` through `end_date`
    pub fn window(&self, series: PriceSeries) -> PriceSeries {
        match (self.start_date, self.end_date) {
            (None, None) => series,
            (start, end) => series.between(start, end.and_then(|e| e.succ_opt())),
        }
    }
}

/// In-sample / out-of-sample boundary
///
/// `fraction` wins over `out_of_sample_start` when both are set.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub out_of_sample_start: NaiveDate,
    pub fraction: Option<f64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            // In-sample runs through the end of 2023
            out_of_sample_start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            fraction: None,
        }
    }
}

impl SplitConfig {
    pub fn split_point(&self) -> SplitPoint {
        match self.fraction {
            Some(fraction) => SplitPoint::Fraction(fraction),
            None => SplitPoint::Date(self.out_of_sample_start),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub objective: Objective,
    pub top_k: usize,
    pub parallel: bool,
    pub max_trials: Option<usize>,
    pub time_limit_secs: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            objective: Objective::Sharpe,
            top_k: 1,
            parallel: true,
            max_trials: None,
            time_limit_secs: None,
        }
    }
}

impl OptimizerConfig {
    pub fn budget(&self) -> SweepBudget {
        SweepBudget {
            max_trials: self.max_trials,
            time_limit: self.time_limit_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for the `fxpairs` target when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Check cross-field constraints the types cannot express
    pub fn validate(&self) -> Result<()> {
        ensure!(self.optimizer.top_k > 0, "optimizer.top_k must be at least 1");
        if let (Some(start), Some(end)) = (self.data.start_date, self.data.end_date) {
            ensure!(start < end, "data.start_date {} is not before data.end_date {}", start, end);
        }
        if let Some(fraction) = self.split.fraction {
            ensure!(
                fraction > 0.0 && fraction < 1.0,
                "split.fraction must be inside (0, 1), got {}",
                fraction
            );
        }
        Ok(())
    }
}

/// Load configuration from an optional TOML file plus `FXPAIRS__` overrides
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    let config: AppConfig = builder
        .add_source(
            Environment::with_prefix("FXPAIRS")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Failed to parse configuration")?;

    config.validate()?;
    Ok(config)
}
