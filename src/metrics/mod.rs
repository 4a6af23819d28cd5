//! Report statistics.

mod calculator;

pub use calculator::MetricsCalculator;
