use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::BacktestError;
use crate::Result;

/// Single dated observation of an exchange rate
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub value: f64,
}

impl PricePoint {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Ordered price history for one asset
///
/// Dates are strictly increasing and values are finite and positive. Outside
/// this crate the only way to build one is through [`PriceSeries::new`], so
/// downstream code can rely on those invariants.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PriceSeries {
    name: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(name: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
        let name = name.into();

        for (i, point) in points.iter().enumerate() {
            if !point.value.is_finite() || point.value <= 0.0 {
                return Err(BacktestError::InvalidSeries {
                    series: name,
                    reason: format!("non-positive value {} on {}", point.value, point.date),
                });
            }
            if i > 0 && point.date <= points[i - 1].date {
                return Err(BacktestError::InvalidSeries {
                    series: name,
                    reason: format!(
                        "dates not strictly increasing at {} (previous {})",
                        point.date,
                        points[i - 1].date
                    ),
                });
            }
        }

        Ok(Self { name, points })
    }

    /// Convenience constructor from parallel date/value slices
    pub fn from_pairs(name: impl Into<String>, dates: &[NaiveDate], values: &[f64]) -> Result<Self> {
        let name = name.into();
        if dates.len() != values.len() {
            return Err(BacktestError::InvalidSeries {
                series: name,
                reason: format!("{} dates but {} values", dates.len(), values.len()),
            });
        }
        let points = dates
            .iter()
            .zip(values)
            .map(|(&date, &value)| PricePoint::new(date, value))
            .collect();
        Self::new(name, points)
    }

    /// Build from points the caller already knows are ordered and positive
    pub(crate) fn from_valid_points(name: impl Into<String>, points: Vec<PricePoint>) -> Self {
        debug_assert!(points.windows(2).all(|w| w[0].date < w[1].date));
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.date)
    }

    /// Sub-series with dates in `[start, end)`; `None` leaves that side open
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> PriceSeries {
        let points = self
            .points
            .iter()
            .filter(|p| start.map_or(true, |s| p.date >= s))
            .filter(|p| end.map_or(true, |e| p.date < e))
            .copied()
            .collect();

        // Filtering an ordered, validated series keeps it valid
        PriceSeries {
            name: self.name.clone(),
            points,
        }
    }
}

/// How the relative value of the two legs is measured
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpreadKind {
    /// ln(a) - ln(b)
    #[default]
    LogRatio,
    /// a / b
    Ratio,
}

/// Derived relative-value series over the common dates of two legs
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Spread {
    pub kind: SpreadKind,
    pub points: Vec<PricePoint>,
}

impl Spread {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }
}

/// Position held on the spread at the close of a date
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    #[default]
    Flat,
    /// Long the spread: profits when it rises back toward the mean
    Long,
    /// Short the spread: profits when it falls back toward the mean
    Short,
}

impl Position {
    pub fn sign(&self) -> f64 {
        match self {
            Position::Flat => 0.0,
            Position::Long => 1.0,
            Position::Short => -1.0,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Position::Flat)
    }

    pub fn direction(&self) -> Option<Direction> {
        match self {
            Position::Flat => None,
            Position::Long => Some(Direction::Long),
            Position::Short => Some(Direction::Short),
        }
    }
}

/// Side of a completed trade
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

/// Per-date output of the signal generator
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SignalState {
    pub date: NaiveDate,
    /// Spread value on this date (the execution price)
    pub spread: f64,
    /// `None` until the lookback window is filled
    pub zscore: Option<f64>,
    pub position: Position,
    /// Spread value at which the current position was opened
    pub entry_price: Option<f64>,
}

/// Why a trade was closed
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Z-score came back inside the exit band
    MeanReverted,
    /// Z-score ran past the stop-loss band
    StopLoss,
    /// Position still open on the final date, closed at the last price
    EndOfData,
}

/// Completed round trip on the spread
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub entry_date: NaiveDate,
    pub exit_date: NaiveDate,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub holding_period_days: i64,
    pub bars_held: usize,
    /// Spread units, net of `cost`
    pub pnl: f64,
    pub cost: f64,
    /// Compounded return on capital over the trade, costs included
    pub trade_return: f64,
    pub exit_reason: ExitReason,
    pub open_at_end: bool,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
