//! Market inputs for one evaluation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::{Asset, AssetAmounts, Sentiment};

/// Sentiment reading plus spot prices, fetched together before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSnapshot {
    pub sentiment: Sentiment,

    /// When the index provider published the reading
    pub sentiment_at: DateTime<Utc>,

    /// USD spot price per asset
    pub prices: AssetAmounts,
}

impl MarketSnapshot {
    pub fn new(sentiment: Sentiment, sentiment_at: DateTime<Utc>, prices: AssetAmounts) -> Self {
        Self {
            sentiment,
            sentiment_at,
            prices,
        }
    }

    pub fn price(&self, asset: Asset) -> Decimal {
        *self.prices.get(asset)
    }
}

/// A single published index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexReading {
    pub value: Sentiment,
    pub at: DateTime<Utc>,
}
