// Spread mean-reversion strategy: parameters, spread construction, signals
pub mod params;
pub mod signals;
pub mod spread;

pub use params::{Parameters, WindowMode};
pub use signals::{generate_signals, next_position, SignalGenerator};
pub use spread::{build_spread, common_dates, MIN_ALIGNED_POINTS};
