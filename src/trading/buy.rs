//! Buy side of the ladder: bucket top-ups and cash-fraction spends.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Asset, MarketSnapshot, PortfolioState, Tier, TradeAction, TradeSide};

use super::ladder::TierFill;
use super::sizing::{even_split, floor_to_step, quantity_for, weighted_average_entry};
use super::{Ladder, LadderEngine};

impl LadderEngine {
    /// Buy tiers run highest level first since they compete for the same cash.
    pub(super) fn evaluate_buys(
        &self,
        state: &mut PortfolioState,
        snapshot: &MarketSnapshot,
    ) -> Vec<TradeAction> {
        let sentiment = snapshot.sentiment;
        let step = self.config().rounding_step;
        let mut actions = Vec::new();

        match &self.config().ladder {
            Ladder::Bucketed { buy, .. } => {
                for tier in buy {
                    if !sentiment.at_or_below(tier.level) {
                        continue;
                    }
                    let invested = state
                        .buckets
                        .get(&tier.level)
                        .map(|b| b.invested_usd)
                        .unwrap_or(Decimal::ZERO);
                    let shortfall = tier.target_usd - invested;
                    if shortfall <= Decimal::ZERO {
                        continue;
                    }
                    let spend = floor_to_step(shortfall.min(state.cash), step);
                    if spend.is_zero() {
                        debug!(tier = %tier.level, shortfall = %shortfall, cash = %state.cash, "Spend rounds to zero, skipping");
                        continue;
                    }
                    actions.extend(buy_tier(state, tier.level, spend, true, snapshot));
                }
            }
            Ladder::PositionFraction { buy, .. } => {
                for tier in buy {
                    if !sentiment.at_or_below(tier.level) || state.is_buy_fired(tier.level) {
                        continue;
                    }
                    let spend = floor_to_step(state.cash * tier.cash_fraction, step);
                    if spend.is_zero() {
                        debug!(tier = %tier.level, cash = %state.cash, "Spend rounds to zero, skipping");
                        continue;
                    }
                    let executed = buy_tier(state, tier.level, spend, false, snapshot);
                    if !executed.is_empty() {
                        state.buy_fired.insert(tier.level, true);
                    }
                    actions.extend(executed);
                }
            }
        }

        actions
    }
}

/// Spend `usd` split evenly across assets, optionally crediting the tier's bucket.
fn buy_tier(
    state: &mut PortfolioState,
    tier: Tier,
    usd: Decimal,
    into_bucket: bool,
    snapshot: &MarketSnapshot,
) -> Vec<TradeAction> {
    let halves = even_split(usd);
    let mut fill = TierFill::default();

    for asset in Asset::ALL {
        let quantity = quantity_for(*halves.get(asset), &snapshot.prices, asset);
        if quantity <= Decimal::ZERO {
            continue;
        }
        let price = snapshot.price(asset);
        let held = *state.holdings.get(asset);
        let notional = fill.record(asset, quantity, price);

        *state.avg_entry.get_mut(asset) =
            weighted_average_entry(*state.avg_entry.get(asset), held, notional, quantity, price);
        *state.holdings.get_mut(asset) += quantity;
        state.cash = (state.cash - notional).max(Decimal::ZERO);

        if into_bucket {
            let bucket = state.buckets.entry(tier).or_default();
            bucket.invested_usd += notional;
            *bucket.holdings.get_mut(asset) += quantity;
        }
    }

    let avg_before = state.avg_entry;
    fill.into_actions(TradeSide::Buy, tier, snapshot, state, &avg_before)
}
