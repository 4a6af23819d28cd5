//! Ledger rows as read back for reporting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Asset, Sentiment, Tier, TradeSide};

/// A persisted asset leg of an executed action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub run_id: String,
    pub executed_at: DateTime<Utc>,
    pub asset: Asset,
    pub side: TradeSide,
    pub tier: Tier,
    pub sentiment: Sentiment,
    pub price: Decimal,
    pub usd_amount: Decimal,

    /// Signed change of holdings (negative for sells)
    pub asset_delta: Decimal,

    pub cash_after: Decimal,
    pub asset_after: Decimal,
    pub avg_entry_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
}

impl LedgerEntry {
    pub fn is_buy(&self) -> bool {
        self.side == TradeSide::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == TradeSide::Sell
    }
}
