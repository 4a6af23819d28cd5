//! Summary figures used by the periodic reports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Statistics over a series of daily index readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of readings in the window
    pub samples: usize,

    /// Earliest reading in the window
    pub first: u8,

    /// Latest reading in the window
    pub last: u8,

    pub min: u8,
    pub min_at: DateTime<Utc>,
    pub max: u8,
    pub max_at: DateTime<Utc>,
    pub mean: f64,
}

/// Direction of the index between the first and last reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTrend {
    Rose,
    Fell,
    Flat,
}

impl IndexStats {
    pub fn trend(&self) -> IndexTrend {
        match self.last.cmp(&self.first) {
            std::cmp::Ordering::Greater => IndexTrend::Rose,
            std::cmp::Ordering::Less => IndexTrend::Fell,
            std::cmp::Ordering::Equal => IndexTrend::Flat,
        }
    }
}

/// Aggregated ledger activity for a reporting period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    pub total_legs: usize,
    pub buy_legs: usize,
    pub sell_legs: usize,
    pub bought_usd: Decimal,
    pub sold_usd: Decimal,
    pub realized_pnl: Decimal,
}

impl LedgerSummary {
    /// Realized PnL as a fraction of the given capital.
    pub fn pnl_pct(&self, base_capital: Decimal) -> Decimal {
        if base_capital.is_zero() {
            return Decimal::ZERO;
        }
        self.realized_pnl / base_capital
    }
}
