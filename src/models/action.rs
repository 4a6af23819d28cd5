//! Actions executed by a single ladder evaluation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Asset, Sentiment, Tier};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(TradeSide::Buy),
            "SELL" => Some(TradeSide::Sell),
            _ => None,
        }
    }
}

/// One asset leg of a tier that fired during a run.
///
/// All amounts are aggregated over the tier (every bucket touched by a sell
/// tier lands in the same action). The `*_after` fields snapshot the
/// portfolio once the whole tier has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeAction {
    pub side: TradeSide,
    pub tier: Tier,
    pub asset: Asset,
    pub sentiment: Sentiment,
    pub price: Decimal,

    /// USD moved between cash and the asset
    pub usd_amount: Decimal,

    /// Units bought or sold (always positive)
    pub quantity: Decimal,

    pub cash_after: Decimal,
    pub holding_after: Decimal,
    pub avg_entry_after: Option<Decimal>,

    /// Proceeds minus cost basis for sells with a known entry price
    pub realized_pnl: Option<Decimal>,
}

impl TradeAction {
    /// Quantity with the sign of its effect on holdings.
    pub fn signed_quantity(&self) -> Decimal {
        match self.side {
            TradeSide::Buy => self.quantity,
            TradeSide::Sell => -self.quantity,
        }
    }
}
