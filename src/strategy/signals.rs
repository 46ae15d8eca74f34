use crate::error::BacktestError;
use crate::indicators::calculate_zscore;
use crate::models::{Position, SignalState, Spread};
use crate::strategy::params::{Parameters, WindowMode};
use crate::Result;

/// Turns a spread into rolling z-scores and discrete positions
///
/// Position changes depend only on today's z-score and yesterday's position:
///
/// - Flat -> Short when z >= entry, Flat -> Long when z <= -entry
/// - Long -> Flat when z >= -exit (reverted) or z <= -stop (stopped out)
/// - Short -> Flat when z <= exit (reverted) or z >= stop (stopped out)
///
/// Long and Short never flip into each other directly; a reversal needs a
/// Flat date in between.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    params: Parameters,
}

impl SignalGenerator {
    pub fn new(params: Parameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// Minimum spread length for at least one defined z-score
    pub fn min_observations(&self) -> usize {
        self.params.lookback_window + 1
    }

    /// Z-score at index `i`, or `None` while the window is still filling
    pub fn zscore_at(&self, values: &[f64], i: usize) -> Option<f64> {
        let window = self.params.lookback_window;
        if i < window || i >= values.len() {
            return None;
        }

        let slice = match self.params.window_mode {
            WindowMode::Trailing => &values[i - window..i],
            WindowMode::Inclusive => &values[i + 1 - window..=i],
        };

        calculate_zscore(values[i], slice)
    }

    /// Produce one signal state per spread date
    pub fn generate(&self, spread: &Spread) -> Result<Vec<SignalState>> {
        if spread.len() < self.min_observations() {
            return Err(BacktestError::InsufficientData {
                available: spread.len(),
                required: self.min_observations(),
            });
        }

        let values = spread.values();
        let mut states = Vec::with_capacity(spread.len());
        let mut position = Position::Flat;
        let mut entry_price = None;

        for (i, point) in spread.points.iter().enumerate() {
            let zscore = self.zscore_at(&values, i);

            if let Some(z) = zscore {
                let next = next_position(position, z, &self.params);
                if next != position {
                    tracing::trace!(
                        "{}: {:?} -> {:?} at z={:.3} spread={:.6}",
                        point.date,
                        position,
                        next,
                        z,
                        point.value
                    );
                    entry_price = if next.is_flat() { None } else { Some(point.value) };
                    position = next;
                }
            }

            states.push(SignalState {
                date: point.date,
                spread: point.value,
                zscore,
                position,
                entry_price,
            });
        }

        Ok(states)
    }
}

/// One step of the position state machine
pub fn next_position(current: Position, z: f64, params: &Parameters) -> Position {
    match current {
        Position::Flat => {
            if z >= params.entry_threshold {
                Position::Short
            } else if z <= -params.entry_threshold {
                Position::Long
            } else {
                Position::Flat
            }
        }
        Position::Long => {
            if z >= -params.exit_threshold || z <= -params.stop_loss_threshold {
                Position::Flat
            } else {
                Position::Long
            }
        }
        Position::Short => {
            if z <= params.exit_threshold || z >= params.stop_loss_threshold {
                Position::Flat
            } else {
                Position::Short
            }
        }
    }
}

/// Convenience wrapper: validate parameters and generate signals
pub fn generate_signals(spread: &Spread, params: &Parameters) -> Result<Vec<SignalState>> {
    SignalGenerator::new(*params)?.generate(spread)
}
