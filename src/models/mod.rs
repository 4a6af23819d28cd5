//! Data models for the virtual portfolio, market inputs, actions, and reports.

mod action;
mod asset;
mod ledger;
mod metrics;
mod portfolio;
mod quote;
mod tier;

pub use action::{TradeAction, TradeSide};
pub use asset::{Asset, AssetAmounts, AvgEntry, PerAsset};
pub use ledger::LedgerEntry;
pub use metrics::{IndexStats, IndexTrend, LedgerSummary};
pub use portfolio::{Bucket, CyclePhase, PortfolioState};
pub use quote::{IndexReading, MarketSnapshot};
pub use tier::{Sentiment, Tier, SENTIMENT_MAX};
