//! Sell side of the ladder: partial releases and full exit.

use rust_decimal::Decimal;
use tracing::debug;

use crate::models::{Asset, Bucket, MarketSnapshot, PortfolioState, Tier, TradeAction, TradeSide};

use super::ladder::TierFill;
use super::sizing::{floor_to_step, quantity_for, value_weighted_split};
use super::{Ladder, LadderEngine, ReleaseTier, SellBandPolicy};

impl LadderEngine {
    pub(super) fn evaluate_sells(
        &self,
        state: &mut PortfolioState,
        snapshot: &MarketSnapshot,
    ) -> Vec<TradeAction> {
        let sentiment = snapshot.sentiment;

        if let Some(exit) = self.config().full_exit {
            if sentiment.at_or_above(exit) {
                return self.liquidate(state, exit, snapshot);
            }
        }

        let tiers = self.config().ladder.sell_tiers();
        let mut actions = Vec::new();

        for (idx, tier) in tiers.iter().enumerate() {
            if !sentiment.at_or_above(tier.level) || state.is_sell_fired(tier.level) {
                continue;
            }
            if self.config().sell_band == SellBandPolicy::Exclusive {
                let above_band = tiers
                    .get(idx + 1)
                    .is_some_and(|next| sentiment.at_or_above(next.level));
                if above_band {
                    continue;
                }
            }

            let avg_before = state.avg_entry;
            let fill = match &self.config().ladder {
                Ladder::Bucketed { .. } => self.release_buckets(state, tier, snapshot),
                Ladder::PositionFraction { .. } => release_position(state, tier, snapshot),
            };

            if !fill.executed() {
                debug!(tier = %tier.level, "Sell tier found nothing to release");
                continue;
            }

            clear_flat_entries(state);
            state.sell_fired.insert(tier.level, true);
            actions.extend(fill.into_actions(
                TradeSide::Sell,
                tier.level,
                snapshot,
                state,
                &avg_before,
            ));
        }

        actions
    }

    /// Release `fraction` of each bucket's target, split by current value.
    ///
    /// Only the capped USD amount is converted to units. Units left over once
    /// a bucket's capital is fully released stay held until `full_exit`.
    fn release_buckets(
        &self,
        state: &mut PortfolioState,
        tier: &ReleaseTier,
        snapshot: &MarketSnapshot,
    ) -> TierFill {
        let mut fill = TierFill::default();
        let Ladder::Bucketed { buy, .. } = &self.config().ladder else {
            return fill;
        };
        let step = self.config().rounding_step;

        for bucket_tier in buy {
            let Some(bucket) = state.buckets.get_mut(&bucket_tier.level) else {
                continue;
            };

            let planned = floor_to_step(bucket_tier.target_usd * tier.fraction, step);
            let release = planned.min(bucket.invested_usd);
            if release <= Decimal::ZERO {
                continue;
            }

            let split = value_weighted_split(release, &bucket.holdings.valued_at(&snapshot.prices));
            let mut executed = false;

            for asset in Asset::ALL {
                let wanted = quantity_for(*split.get(asset), &snapshot.prices, asset);
                let quantity = wanted
                    .min(*bucket.holdings.get(asset))
                    .min(*state.holdings.get(asset));
                if quantity <= Decimal::ZERO {
                    continue;
                }

                *bucket.holdings.get_mut(asset) -= quantity;
                *state.holdings.get_mut(asset) -= quantity;
                state.cash += fill.record(asset, quantity, snapshot.price(asset));
                executed = true;
            }

            if executed {
                bucket.invested_usd = (bucket.invested_usd - release).max(Decimal::ZERO);
            }
            // Capital without units can never be released
            if bucket.holdings.is_empty() {
                bucket.invested_usd = Decimal::ZERO;
            }
        }

        fill
    }

    /// Sell every unit held and empty all buckets.
    fn liquidate(
        &self,
        state: &mut PortfolioState,
        exit: Tier,
        snapshot: &MarketSnapshot,
    ) -> Vec<TradeAction> {
        let avg_before = state.avg_entry;
        let mut fill = TierFill::default();

        for asset in Asset::ALL {
            let quantity = *state.holdings.get(asset);
            if quantity <= Decimal::ZERO {
                continue;
            }
            *state.holdings.get_mut(asset) = Decimal::ZERO;
            state.cash += fill.record(asset, quantity, snapshot.price(asset));
        }
        for bucket in state.buckets.values_mut() {
            *bucket = Bucket::default();
        }
        clear_flat_entries(state);

        debug!(tier = %exit, "Full exit reached, liquidating");
        fill.into_actions(TradeSide::Sell, exit, snapshot, state, &avg_before)
    }
}

/// Release `fraction` of the whole holding of each asset.
fn release_position(
    state: &mut PortfolioState,
    tier: &ReleaseTier,
    snapshot: &MarketSnapshot,
) -> TierFill {
    let mut fill = TierFill::default();
    for asset in Asset::ALL {
        let held = *state.holdings.get(asset);
        let quantity = (held * tier.fraction).min(held);
        if quantity <= Decimal::ZERO {
            continue;
        }
        *state.holdings.get_mut(asset) -= quantity;
        state.cash += fill.record(asset, quantity, snapshot.price(asset));
    }
    fill
}

/// Drop the entry price of any asset no longer held.
fn clear_flat_entries(state: &mut PortfolioState) {
    for asset in Asset::ALL {
        if *state.holdings.get(asset) <= Decimal::ZERO {
            *state.avg_entry.get_mut(asset) = None;
        }
    }
}
