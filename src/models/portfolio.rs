//! Virtual portfolio carried between runs.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetAmounts, AvgEntry, Tier};

/// Capital and units deployed at a single buy tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    /// USD currently attributed to this tier
    #[serde(default)]
    pub invested_usd: Decimal,

    /// Units bought at this tier and not yet released
    #[serde(default)]
    pub holdings: AssetAmounts,
}

/// Where the portfolio sits in its accumulate/distribute cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    /// Fully out of position; every tier is armed.
    Empty,
    /// Some capital or units are deployed.
    Invested,
}

/// Full persisted portfolio record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioState {
    /// Reference capital for percentage reporting
    pub base_capital: Decimal,

    /// Uninvested virtual USD
    pub cash: Decimal,

    /// Units held across all buckets
    pub holdings: AssetAmounts,

    /// Volume-weighted entry price per asset
    #[serde(default)]
    pub avg_entry: AvgEntry,

    /// Per buy tier sub-ledgers (bucketed ladder only)
    #[serde(default)]
    pub buckets: BTreeMap<Tier, Bucket>,

    /// Sell tiers that already fired this cycle
    #[serde(default)]
    pub sell_fired: BTreeMap<Tier, bool>,

    /// Buy tiers that already fired this cycle (position-fraction ladder only)
    #[serde(default)]
    pub buy_fired: BTreeMap<Tier, bool>,
}

impl PortfolioState {
    /// A fresh record: all capital in cash, nothing deployed, every tier armed.
    pub fn new(
        base_capital: Decimal,
        bucket_tiers: impl IntoIterator<Item = Tier>,
        sell_tiers: impl IntoIterator<Item = Tier>,
        buy_flag_tiers: impl IntoIterator<Item = Tier>,
    ) -> Self {
        Self {
            base_capital,
            cash: base_capital,
            holdings: AssetAmounts::default(),
            avg_entry: AvgEntry::default(),
            buckets: bucket_tiers
                .into_iter()
                .map(|tier| (tier, Bucket::default()))
                .collect(),
            sell_fired: sell_tiers.into_iter().map(|tier| (tier, false)).collect(),
            buy_fired: buy_flag_tiers.into_iter().map(|tier| (tier, false)).collect(),
        }
    }

    /// USD attributed to all buckets.
    pub fn total_invested(&self) -> Decimal {
        self.buckets.values().map(|b| b.invested_usd).sum()
    }

    pub fn phase(&self) -> CyclePhase {
        if self.total_invested() <= Decimal::ZERO && self.holdings.is_empty() {
            CyclePhase::Empty
        } else {
            CyclePhase::Invested
        }
    }

    pub fn is_sell_fired(&self, tier: Tier) -> bool {
        self.sell_fired.get(&tier).copied().unwrap_or(false)
    }

    pub fn is_buy_fired(&self, tier: Tier) -> bool {
        self.buy_fired.get(&tier).copied().unwrap_or(false)
    }

    /// Cash plus holdings marked at the given prices.
    pub fn total_value(&self, prices: &AssetAmounts) -> Decimal {
        self.cash + self.holdings.value_at(prices)
    }

    /// Change of total value against base capital, as a fraction.
    pub fn return_pct(&self, prices: &AssetAmounts) -> Decimal {
        if self.base_capital.is_zero() {
            return Decimal::ZERO;
        }
        self.total_value(prices) / self.base_capital - Decimal::ONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fresh() -> PortfolioState {
        PortfolioState::new(dec!(10000), [Tier(40), Tier(35)], [Tier(60)], [])
    }

    #[test]
    fn test_fresh_state_is_empty() {
        let state = fresh();
        assert_eq!(state.cash, dec!(10000));
        assert_eq!(state.phase(), CyclePhase::Empty);
        assert_eq!(state.buckets.len(), 2);
        assert!(!state.is_sell_fired(Tier(60)));
        assert!(!state.is_sell_fired(Tier(99)));
    }

    #[test]
    fn test_phase_tracks_invested_capital_and_units() {
        let mut state = fresh();
        state.buckets.get_mut(&Tier(40)).unwrap().invested_usd = dec!(100);
        assert_eq!(state.phase(), CyclePhase::Invested);

        state.buckets.get_mut(&Tier(40)).unwrap().invested_usd = Decimal::ZERO;
        state.holdings.eth = dec!(0.001);
        assert_eq!(state.phase(), CyclePhase::Invested);
    }

    #[test]
    fn test_return_pct() {
        let mut state = fresh();
        state.cash = dec!(9000);
        state.holdings.btc = dec!(0.02);
        let prices = AssetAmounts::new(dec!(60000), dec!(3000));

        assert_eq!(state.total_value(&prices), dec!(10200));
        assert_eq!(state.return_pct(&prices), dec!(0.02));
    }
}
