use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::models::SpreadKind;
use crate::Result;

/// Which observations the rolling z-score window covers
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// The `lookback_window` observations before the current one
    #[default]
    Trailing,
    /// The `lookback_window` observations ending at the current one
    Inclusive,
}

/// One candidate parameter set for the spread strategy
///
/// Besides the tunable thresholds this carries the conventions that decide
/// how the engine reads the data (annualization, window edge, spread form),
/// so a run is fully determined by its inputs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Parameters {
    /// Observations in the rolling mean/std window
    pub lookback_window: usize,

    /// |z| needed to open a position (e.g. 2.0)
    pub entry_threshold: f64,

    /// Position closes once z is back inside this band (e.g. 0.5)
    pub exit_threshold: f64,

    /// Position closes when z runs past this band (must be >= entry)
    pub stop_loss_threshold: f64,

    /// Cost per side in basis points of the traded spread value
    pub transaction_cost_bps: f64,

    /// Periods per year used for annualization (252 for daily FX)
    #[serde(default = "default_periods_per_year")]
    pub periods_per_year: f64,

    #[serde(default)]
    pub window_mode: WindowMode,

    #[serde(default)]
    pub spread_kind: SpreadKind,
}

fn default_periods_per_year() -> f64 {
    252.0
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            lookback_window: 60,       // ~3 months of trading days
            entry_threshold: 2.0,      // 2 std devs from the rolling mean
            exit_threshold: 0.5,       // Close once back within 0.5 std devs
            stop_loss_threshold: 4.0,  // Give up when the divergence keeps growing
            transaction_cost_bps: 2.0, // 2 bps per side
            periods_per_year: default_periods_per_year(),
            window_mode: WindowMode::default(),
            spread_kind: SpreadKind::default(),
        }
    }
}

impl Parameters {
    pub fn new(
        lookback_window: usize,
        entry_threshold: f64,
        exit_threshold: f64,
        stop_loss_threshold: f64,
        transaction_cost_bps: f64,
    ) -> Self {
        Self {
            lookback_window,
            entry_threshold,
            exit_threshold,
            stop_loss_threshold,
            transaction_cost_bps,
            ..Self::default()
        }
    }

    pub fn with_window_mode(mut self, mode: WindowMode) -> Self {
        self.window_mode = mode;
        self
    }

    pub fn with_spread_kind(mut self, kind: SpreadKind) -> Self {
        self.spread_kind = kind;
        self
    }

    pub fn with_periods_per_year(mut self, periods: f64) -> Self {
        self.periods_per_year = periods;
        self
    }

    /// Cost per side as a fraction of the traded price
    pub fn cost_rate(&self) -> f64 {
        self.transaction_cost_bps / 10_000.0
    }

    /// Validate ranges and the ordering of the thresholds
    pub fn validate(&self) -> Result<()> {
        if self.lookback_window < 2 {
            return Err(BacktestError::invalid_parameter(
                "lookback_window",
                format!("must be greater than 1, got {}", self.lookback_window),
            ));
        }
        if !self.entry_threshold.is_finite() || self.entry_threshold <= 0.0 {
            return Err(BacktestError::invalid_parameter(
                "entry_threshold",
                format!("must be positive, got {}", self.entry_threshold),
            ));
        }
        if !self.exit_threshold.is_finite() || self.exit_threshold < 0.0 {
            return Err(BacktestError::invalid_parameter(
                "exit_threshold",
                format!("must be non-negative, got {}", self.exit_threshold),
            ));
        }
        // An infinite stop-loss is allowed and simply never triggers
        if self.stop_loss_threshold.is_nan() || self.stop_loss_threshold < self.entry_threshold {
            return Err(BacktestError::invalid_parameter(
                "stop_loss_threshold",
                format!(
                    "must be >= entry threshold {}, got {}",
                    self.entry_threshold, self.stop_loss_threshold
                ),
            ));
        }
        if self.exit_threshold >= self.stop_loss_threshold {
            return Err(BacktestError::invalid_parameter(
                "exit_threshold",
                format!(
                    "must be below stop-loss threshold {}, got {}",
                    self.stop_loss_threshold, self.exit_threshold
                ),
            ));
        }
        // A side costing the whole capital would wipe out equity
        if !self.transaction_cost_bps.is_finite()
            || self.transaction_cost_bps < 0.0
            || self.transaction_cost_bps >= 10_000.0
        {
            return Err(BacktestError::invalid_parameter(
                "transaction_cost_bps",
                format!("must be in [0, 10000), got {}", self.transaction_cost_bps),
            ));
        }
        if !self.periods_per_year.is_finite() || self.periods_per_year <= 0.0 {
            return Err(BacktestError::invalid_parameter(
                "periods_per_year",
                format!("must be positive, got {}", self.periods_per_year),
            ));
        }
        Ok(())
    }

    /// Total order used to break ranking ties
    ///
    /// Shorter lookback first, then entry, exit, stop-loss and cost ascending.
    pub fn tie_break_cmp(&self, other: &Self) -> Ordering {
        self.lookback_window
            .cmp(&other.lookback_window)
            .then_with(|| self.entry_threshold.total_cmp(&other.entry_threshold))
            .then_with(|| self.exit_threshold.total_cmp(&other.exit_threshold))
            .then_with(|| self.stop_loss_threshold.total_cmp(&other.stop_loss_threshold))
            .then_with(|| self.transaction_cost_bps.total_cmp(&other.transaction_cost_bps))
    }

    /// Compact label for logs and reports
    pub fn label(&self) -> String {
        format!(
            "window={} entry={:.2} exit={:.2} stop={:.2} cost={:.1}bps",
            self.lookback_window,
            self.entry_threshold,
            self.exit_threshold,
            self.stop_loss_threshold,
            self.transaction_cost_bps
        )
    }
}
