//! Ladder engine: maps one sentiment reading onto buys, sells, and cycle resets.

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::error::RunError;
use crate::models::{
    Asset, AssetAmounts, AvgEntry, CyclePhase, MarketSnapshot, PortfolioState, Tier,
    TradeAction, TradeSide,
};

use super::StrategyConfig;

/// Result of evaluating one snapshot against a prior state.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// State to persist
    pub state: PortfolioState,

    /// Executed actions, in execution order
    pub actions: Vec<TradeAction>,

    /// The prior state was already flat and carried stale flags or buckets
    pub recovered_empty: bool,

    /// Sells during this evaluation closed the cycle
    pub cycle_completed: bool,
}

impl Evaluation {
    pub fn is_noop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Pure, synchronous ladder evaluator.
#[derive(Debug, Clone)]
pub struct LadderEngine {
    config: StrategyConfig,
}

impl LadderEngine {
    /// Validate the strategy and build an engine for it.
    pub fn new(config: StrategyConfig) -> Result<Self, RunError> {
        Ok(Self {
            config: config.normalized()?,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Fresh state for a first run: all capital in cash, every tier armed.
    pub fn bootstrap_state(&self) -> PortfolioState {
        let (bucket_tiers, buy_flag_tiers) = self.tier_sets();
        PortfolioState::new(
            self.config.base_capital,
            bucket_tiers,
            self.sell_levels(),
            buy_flag_tiers,
        )
    }

    /// Apply one reading to `prior`.
    ///
    /// Sells are evaluated before buys. The two never overlap because the
    /// highest buy tier sits below the lowest sell tier.
    pub fn evaluate(&self, prior: &PortfolioState, snapshot: &MarketSnapshot) -> Evaluation {
        let mut state = prior.clone();
        self.align_tiers(&mut state);

        let mut recovered_empty = false;
        if state.phase() == CyclePhase::Empty {
            let before = state.clone();
            self.reset_cycle(&mut state, false);
            recovered_empty = state != before;
            if recovered_empty {
                info!("Prior state was flat with stale tier data, reset before evaluation");
            }
        }

        let mut actions = Vec::new();
        let mut cycle_completed = false;

        if state.phase() == CyclePhase::Invested {
            actions.extend(self.evaluate_sells(&mut state, snapshot));
            if state.phase() == CyclePhase::Empty {
                self.reset_cycle(&mut state, self.config.restore_base_cash_on_reset);
                cycle_completed = true;
                info!(sentiment = %snapshot.sentiment, "Cycle completed, all tiers re-armed");
            }
        }

        actions.extend(self.evaluate_buys(&mut state, snapshot));

        Evaluation {
            state,
            actions,
            recovered_empty,
            cycle_completed,
        }
    }

    // ==================== Cycle bookkeeping ====================

    /// Clear buckets, flags, and cost bases.
    pub(super) fn reset_cycle(&self, state: &mut PortfolioState, restore_cash: bool) {
        let fresh = self.bootstrap_state();
        state.holdings = AssetAmounts::default();
        state.avg_entry = AvgEntry::default();
        state.buckets = fresh.buckets;
        state.sell_fired = fresh.sell_fired;
        state.buy_fired = fresh.buy_fired;
        if restore_cash {
            state.cash = self.config.base_capital;
        }
    }

    /// Make sure every configured tier has a bucket and flag entry.
    ///
    /// Entries for tiers no longer configured are kept so that no capital
    /// is silently dropped.
    fn align_tiers(&self, state: &mut PortfolioState) {
        let (bucket_tiers, buy_flag_tiers) = self.tier_sets();
        for tier in bucket_tiers {
            state.buckets.entry(tier).or_default();
        }
        for tier in buy_flag_tiers {
            state.buy_fired.entry(tier).or_insert(false);
        }
        for tier in self.sell_levels() {
            state.sell_fired.entry(tier).or_insert(false);
        }
    }

    fn tier_sets(&self) -> (Vec<Tier>, Vec<Tier>) {
        let levels = self.config.ladder.buy_levels();
        if self.config.ladder.is_bucketed() {
            (levels, Vec::new())
        } else {
            (Vec::new(), levels)
        }
    }

    fn sell_levels(&self) -> Vec<Tier> {
        self.config.ladder.sell_tiers().iter().map(|t| t.level).collect()
    }
}

// ==================== Tier fills ====================

/// Per-asset totals executed by one tier.
#[derive(Debug, Default)]
pub(super) struct TierFill {
    quantity: AssetAmounts,
    usd: AssetAmounts,
}

impl TierFill {
    /// Record a fill and return its notional.
    pub(super) fn record(&mut self, asset: Asset, quantity: Decimal, price: Decimal) -> Decimal {
        if quantity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let notional = quantity * price;
        *self.quantity.get_mut(asset) += quantity;
        *self.usd.get_mut(asset) += notional;
        notional
    }

    pub(super) fn executed(&self) -> bool {
        !self.quantity.is_empty()
    }

    /// One action per traded asset, snapshotting `state` after the tier.
    pub(super) fn into_actions(
        self,
        side: TradeSide,
        tier: Tier,
        snapshot: &MarketSnapshot,
        state: &PortfolioState,
        avg_before: &AvgEntry,
    ) -> Vec<TradeAction> {
        Asset::ALL
            .into_iter()
            .filter(|asset| *self.quantity.get(*asset) > Decimal::ZERO)
            .map(|asset| {
                let quantity = *self.quantity.get(asset);
                let usd_amount = *self.usd.get(asset);
                let realized_pnl = match side {
                    TradeSide::Sell => avg_before.get(asset).map(|avg| usd_amount - quantity * avg),
                    TradeSide::Buy => None,
                };
                debug!(
                    side = side.as_str(),
                    tier = %tier,
                    asset = %asset,
                    usd = %usd_amount,
                    quantity = %quantity,
                    "Tier executed"
                );
                TradeAction {
                    side,
                    tier,
                    asset,
                    sentiment: snapshot.sentiment,
                    price: snapshot.price(asset),
                    usd_amount,
                    quantity,
                    cash_after: state.cash,
                    holding_after: *state.holdings.get(asset),
                    avg_entry_after: *state.avg_entry.get(asset),
                    realized_pnl,
                }
            })
            .collect()
    }
}
