//! Strategy configuration: ladder tiers, rounding, and cycle policy.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::RunError;
use crate::models::{Tier, SENTIMENT_MAX};

/// Buy tier of the bucketed ladder: keep `target_usd` deployed while fear
/// is at or below `level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketTier {
    pub level: Tier,
    pub target_usd: Decimal,
}

/// Buy tier of the position-fraction ladder: spend a share of current cash
/// once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendTier {
    pub level: Tier,
    pub cash_fraction: Decimal,
}

/// Sell tier shared by both ladders.
///
/// Bucketed: releases `fraction` of each bucket's target allocation.
/// Position-fraction: releases `fraction` of the current holding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseTier {
    pub level: Tier,
    pub fraction: Decimal,
}

/// Which sell tiers may fire for a reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellBandPolicy {
    /// Every armed tier at or below the reading fires.
    #[default]
    Cumulative,
    /// Only the tier whose band `[level, next_level)` holds the reading fires.
    Exclusive,
}

/// Ladder semantics. The two variants size trades differently and never mix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Ladder {
    /// Each buy tier owns a bucket topped up to an absolute USD target;
    /// sells unwind buckets proportionally to their targets.
    Bucketed {
        buy: Vec<BucketTier>,
        sell: Vec<ReleaseTier>,
    },
    /// Each buy tier spends a fraction of remaining cash once per cycle;
    /// sells release a fraction of the whole position.
    PositionFraction {
        buy: Vec<SpendTier>,
        sell: Vec<ReleaseTier>,
    },
}

impl Ladder {
    /// Buy thresholds, most conservative (highest) first.
    pub fn buy_levels(&self) -> Vec<Tier> {
        match self {
            Ladder::Bucketed { buy, .. } => buy.iter().map(|t| t.level).collect(),
            Ladder::PositionFraction { buy, .. } => buy.iter().map(|t| t.level).collect(),
        }
    }

    /// Sell tiers, lowest first.
    pub fn sell_tiers(&self) -> &[ReleaseTier] {
        match self {
            Ladder::Bucketed { sell, .. } | Ladder::PositionFraction { sell, .. } => sell,
        }
    }

    pub fn is_bucketed(&self) -> bool {
        matches!(self, Ladder::Bucketed { .. })
    }

    pub fn mode_name(&self) -> &'static str {
        match self {
            Ladder::Bucketed { .. } => "bucketed",
            Ladder::PositionFraction { .. } => "position_fraction",
        }
    }
}

/// Immutable strategy parameters handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Reference capital, also the bootstrap cash balance
    pub base_capital: Decimal,

    /// Spend and release amounts are floored to a multiple of this
    pub rounding_step: Decimal,

    pub ladder: Ladder,

    #[serde(default)]
    pub sell_band: SellBandPolicy,

    /// At or above this reading everything is sold and the cycle restarts
    #[serde(default)]
    pub full_exit: Option<Tier>,

    /// Reset cash to `base_capital` whenever a cycle completes
    #[serde(default = "restore_cash_default")]
    pub restore_base_cash_on_reset: bool,
}

fn restore_cash_default() -> bool {
    true
}

impl Default for StrategyConfig {
    fn default() -> Self {
        let buy = [
            (40, dec!(1100)),
            (35, dec!(1500)),
            (30, dec!(1850)),
            (25, dec!(1850)),
            (20, dec!(1850)),
            (15, dec!(1850)),
        ]
        .into_iter()
        .map(|(level, target_usd)| BucketTier {
            level: Tier(level),
            target_usd,
        })
        .collect();

        let sell = [60, 65, 70, 75]
            .into_iter()
            .map(|level| ReleaseTier {
                level: Tier(level),
                fraction: dec!(0.25),
            })
            .collect();

        Self {
            base_capital: dec!(10000),
            rounding_step: dec!(50),
            ladder: Ladder::Bucketed { buy, sell },
            sell_band: SellBandPolicy::Cumulative,
            full_exit: None,
            restore_base_cash_on_reset: restore_cash_default(),
        }
    }
}

impl StrategyConfig {
    /// Load a JSON strategy file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read strategy file {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse strategy file {}", path.display()))?;
        Ok(config)
    }

    /// Sort tiers into evaluation order and check invariants.
    ///
    /// Buy tiers end up highest level first, sell tiers lowest first.
    pub fn normalized(mut self) -> Result<Self, RunError> {
        match &mut self.ladder {
            Ladder::Bucketed { buy, sell } => {
                buy.sort_by(|a, b| b.level.cmp(&a.level));
                sell.sort_by_key(|t| t.level);
            }
            Ladder::PositionFraction { buy, sell } => {
                buy.sort_by(|a, b| b.level.cmp(&a.level));
                sell.sort_by_key(|t| t.level);
            }
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), RunError> {
        let invalid = |msg: String| Err(RunError::InvalidStrategy(msg));

        if self.base_capital <= Decimal::ZERO {
            return invalid(format!("base_capital must be positive, got {}", self.base_capital));
        }
        if self.rounding_step <= Decimal::ZERO {
            return invalid(format!("rounding_step must be positive, got {}", self.rounding_step));
        }

        let buy_levels = self.ladder.buy_levels();
        let sell_tiers = self.ladder.sell_tiers();
        if buy_levels.is_empty() {
            return invalid("ladder has no buy tiers".to_string());
        }
        if sell_tiers.is_empty() {
            return invalid("ladder has no sell tiers".to_string());
        }

        check_levels("buy", buy_levels.iter().copied())?;
        check_levels("sell", sell_tiers.iter().map(|t| t.level))?;
        if let Some(exit) = self.full_exit {
            check_levels("full_exit", std::iter::once(exit))?;
        }

        for tier in sell_tiers {
            check_fraction("sell", tier.level, tier.fraction)?;
        }
        match &self.ladder {
            Ladder::Bucketed { buy, .. } => {
                for tier in buy {
                    if tier.target_usd <= Decimal::ZERO {
                        return invalid(format!(
                            "buy tier {} target_usd must be positive, got {}",
                            tier.level, tier.target_usd
                        ));
                    }
                }
            }
            Ladder::PositionFraction { buy, sell } => {
                for tier in buy {
                    check_fraction("buy", tier.level, tier.cash_fraction)?;
                }
                // Partial releases alone never bring holdings to zero
                let closes = sell.iter().any(|t| t.fraction == Decimal::ONE);
                if self.full_exit.is_none() && !closes {
                    return invalid(
                        "position_fraction ladder needs full_exit or a sell tier with fraction 1"
                            .to_string(),
                    );
                }
            }
        }

        // Overlapping ladders would buy and sell on the same reading.
        let highest_buy = buy_levels.iter().max().copied();
        let lowest_sell = sell_tiers.iter().map(|t| t.level).min();
        if let (Some(buy), Some(sell)) = (highest_buy, lowest_sell) {
            if buy >= sell {
                return invalid(format!(
                    "highest buy tier {} must sit below lowest sell tier {}",
                    buy, sell
                ));
            }
            if let Some(exit) = self.full_exit {
                if exit <= buy {
                    return invalid(format!(
                        "full_exit {} must sit above highest buy tier {}",
                        exit, buy
                    ));
                }
            }
        }

        Ok(())
    }
}

fn check_levels(kind: &str, levels: impl Iterator<Item = Tier>) -> Result<(), RunError> {
    let mut seen = BTreeSet::new();
    for level in levels {
        if level.level() > SENTIMENT_MAX {
            return Err(RunError::InvalidStrategy(format!(
                "{} tier {} is above {}",
                kind, level, SENTIMENT_MAX
            )));
        }
        if !seen.insert(level) {
            return Err(RunError::InvalidStrategy(format!(
                "duplicate {} tier {}",
                kind, level
            )));
        }
    }
    Ok(())
}

fn check_fraction(kind: &str, level: Tier, fraction: Decimal) -> Result<(), RunError> {
    if fraction <= Decimal::ZERO || fraction > Decimal::ONE {
        return Err(RunError::InvalidStrategy(format!(
            "{} tier {} fraction must be in (0, 1], got {}",
            kind, level, fraction
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_sum_to_base_capital() {
        let config = StrategyConfig::default();
        let Ladder::Bucketed { buy, sell } = &config.ladder else {
            panic!("default ladder should be bucketed");
        };

        let total: Decimal = buy.iter().map(|t| t.target_usd).sum();
        assert_eq!(total, config.base_capital);

        let released: Decimal = sell.iter().map(|t| t.fraction).sum();
        assert_eq!(released, Decimal::ONE);
        assert!(config.normalized().is_ok());
    }

    #[test]
    fn test_normalized_sorts_tiers() {
        let config = StrategyConfig {
            ladder: Ladder::Bucketed {
                buy: vec![
                    BucketTier { level: Tier(15), target_usd: dec!(500) },
                    BucketTier { level: Tier(30), target_usd: dec!(500) },
                ],
                sell: vec![
                    ReleaseTier { level: Tier(80), fraction: dec!(0.5) },
                    ReleaseTier { level: Tier(60), fraction: dec!(0.5) },
                ],
            },
            full_exit: None,
            ..Default::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(config.ladder.buy_levels(), vec![Tier(30), Tier(15)]);
        let sells: Vec<_> = config.ladder.sell_tiers().iter().map(|t| t.level).collect();
        assert_eq!(sells, vec![Tier(60), Tier(80)]);
    }

    #[test]
    fn test_rejects_bad_ladders() {
        let duplicate = StrategyConfig {
            ladder: Ladder::Bucketed {
                buy: vec![
                    BucketTier { level: Tier(20), target_usd: dec!(500) },
                    BucketTier { level: Tier(20), target_usd: dec!(700) },
                ],
                sell: vec![ReleaseTier { level: Tier(60), fraction: dec!(1) }],
            },
            ..Default::default()
        };
        assert!(matches!(duplicate.normalized(), Err(RunError::InvalidStrategy(_))));

        let overlapping = StrategyConfig {
            ladder: Ladder::PositionFraction {
                buy: vec![SpendTier { level: Tier(65), cash_fraction: dec!(0.2) }],
                sell: vec![ReleaseTier { level: Tier(60), fraction: dec!(0.5) }],
            },
            full_exit: None,
            ..Default::default()
        };
        assert!(overlapping.normalized().is_err());

        let bad_fraction = StrategyConfig {
            ladder: Ladder::PositionFraction {
                buy: vec![SpendTier { level: Tier(20), cash_fraction: dec!(1.5) }],
                sell: vec![ReleaseTier { level: Tier(60), fraction: dec!(0.5) }],
            },
            ..Default::default()
        };
        assert!(bad_fraction.normalized().is_err());

        let zero_step = StrategyConfig {
            rounding_step: Decimal::ZERO,
            ..Default::default()
        };
        assert!(zero_step.normalized().is_err());
    }

    #[test]
    fn test_position_fraction_must_close_cycle() {
        let ladder = |fraction| Ladder::PositionFraction {
            buy: vec![SpendTier { level: Tier(20), cash_fraction: dec!(0.5) }],
            sell: vec![
                ReleaseTier { level: Tier(60), fraction: dec!(0.5) },
                ReleaseTier { level: Tier(80), fraction },
            ],
        };

        let open_ended = StrategyConfig {
            ladder: ladder(dec!(0.5)),
            full_exit: None,
            ..Default::default()
        };
        let err = open_ended.normalized().unwrap_err();
        assert!(err.to_string().contains("full_exit"));

        let with_exit = StrategyConfig {
            ladder: ladder(dec!(0.5)),
            full_exit: Some(Tier(90)),
            ..Default::default()
        };
        assert!(with_exit.normalized().is_ok());

        let full_release = StrategyConfig {
            ladder: ladder(Decimal::ONE),
            full_exit: None,
            ..Default::default()
        };
        assert!(full_release.normalized().is_ok());
    }

    #[test]
    fn test_parses_json_strategy() {
        let json = r#"{
            "base_capital": "5000",
            "rounding_step": 25,
            "ladder": {
                "mode": "position_fraction",
                "buy": [{"level": 25, "cash_fraction": "0.3"}, {"level": 10, "cash_fraction": 0.5}],
                "sell": [{"level": 70, "fraction": "0.5"}]
            },
            "sell_band": "exclusive",
            "full_exit": 85
        }"#;

        let config: StrategyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.base_capital, dec!(5000));
        assert_eq!(config.sell_band, SellBandPolicy::Exclusive);
        assert_eq!(config.full_exit, Some(Tier(85)));
        assert!(config.restore_base_cash_on_reset);
        assert!(!config.ladder.is_bucketed());
        assert!(config.normalized().is_ok());
    }
}
