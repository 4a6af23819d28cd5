//! Tracked assets and per-asset value containers.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An asset the ladder trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    Btc,
    Eth,
}

impl Asset {
    /// Every tracked asset, in reporting order.
    pub const ALL: [Asset; 2] = [Asset::Btc, Asset::Eth];

    pub fn symbol(&self) -> &'static str {
        match self {
            Asset::Btc => "BTC",
            Asset::Eth => "ETH",
        }
    }

    /// CoinGecko coin id used for spot prices.
    pub fn coingecko_id(&self) -> &'static str {
        match self {
            Asset::Btc => "bitcoin",
            Asset::Eth => "ethereum",
        }
    }

    /// Parse a symbol such as `BTC` or a quote pair such as `ETHUSDT`.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().to_uppercase().as_str() {
            "BTC" | "BTCUSDT" | "BTCUSD" => Some(Asset::Btc),
            "ETH" | "ETHUSDT" | "ETHUSD" => Some(Asset::Eth),
            _ => None,
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One value per tracked asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerAsset<T> {
    #[serde(default)]
    pub btc: T,
    #[serde(default)]
    pub eth: T,
}

/// Quantities (or prices) keyed by asset.
pub type AssetAmounts = PerAsset<Decimal>;

/// Volume-weighted entry prices; `None` while nothing is held.
pub type AvgEntry = PerAsset<Option<Decimal>>;

impl<T> PerAsset<T> {
    pub fn new(btc: T, eth: T) -> Self {
        Self { btc, eth }
    }

    pub fn get(&self, asset: Asset) -> &T {
        match asset {
            Asset::Btc => &self.btc,
            Asset::Eth => &self.eth,
        }
    }

    pub fn get_mut(&mut self, asset: Asset) -> &mut T {
        match asset {
            Asset::Btc => &mut self.btc,
            Asset::Eth => &mut self.eth,
        }
    }
}

impl PerAsset<Decimal> {
    /// True when every amount is zero or below.
    pub fn is_empty(&self) -> bool {
        self.btc <= Decimal::ZERO && self.eth <= Decimal::ZERO
    }

    /// Mark-to-market value per asset.
    pub fn valued_at(&self, prices: &AssetAmounts) -> AssetAmounts {
        PerAsset::new(self.btc * prices.btc, self.eth * prices.eth)
    }

    /// Total mark-to-market value.
    pub fn value_at(&self, prices: &AssetAmounts) -> Decimal {
        let values = self.valued_at(prices);
        values.btc + values.eth
    }
}
