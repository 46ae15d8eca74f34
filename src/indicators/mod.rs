// Rolling statistics used by the spread signal generator

pub mod rolling;

pub use rolling::{calculate_mean, calculate_std, calculate_zscore, MIN_STD_DEV};
