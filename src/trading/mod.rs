//! Trading logic: strategy ladder, sizing math, and the evaluation engine.

mod buy;
mod config;
mod ladder;
mod sell;
mod sizing;

pub use config::{BucketTier, Ladder, ReleaseTier, SellBandPolicy, SpendTier, StrategyConfig};
pub use ladder::LadderEngine;
