use serde::Serialize;
use thiserror::Error;

/// Errors raised by the backtesting engine
///
/// Alignment, parameter, data and series errors belong to a single trial and
/// are recorded by the optimizer as failed trials. `MalformedGrid` and
/// `InvalidSplit` describe a misconfigured sweep and abort it immediately.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BacktestError {
    /// Fewer than two dates are shared by both price series
    #[error("alignment failed: {common} common dates, need at least {required}")]
    Alignment { common: usize, required: usize },

    /// A parameter is out of range or inconsistent with another one
    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// The lookback window does not fit in the available history
    #[error("insufficient data: {available} observations, need at least {required}")]
    InsufficientData { available: usize, required: usize },

    /// Caller supplied a price series that breaks its invariants
    #[error("invalid price series `{series}`: {reason}")]
    InvalidSeries { series: String, reason: String },

    /// The parameter grid itself cannot be enumerated
    #[error("malformed parameter grid: {reason}")]
    MalformedGrid { reason: String },

    /// The in-sample/out-of-sample split leaves an unusable window
    #[error("invalid split: {reason}")]
    InvalidSplit { reason: String },
}

impl BacktestError {
    /// Whether the optimizer can record this as a failed trial and continue
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            BacktestError::MalformedGrid { .. } | BacktestError::InvalidSplit { .. }
        )
    }

    pub(crate) fn invalid_parameter(field: &'static str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidParameter {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_grid(reason: impl Into<String>) -> Self {
        BacktestError::MalformedGrid {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_split(reason: impl Into<String>) -> Self {
        BacktestError::InvalidSplit {
            reason: reason.into(),
        }
    }
}
