//! Sizing math shared by the buy and sell paths.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::models::{Asset, AssetAmounts, PerAsset};

/// Floor `amount` to a whole multiple of `step`.
///
/// Non-positive amounts and steps yield zero.
pub fn floor_to_step(amount: Decimal, step: Decimal) -> Decimal {
    if amount <= Decimal::ZERO || step <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (amount / step).floor() * step
}

/// Volume-weighted entry price after buying `bought` units for `spent` USD.
///
/// When nothing was held before, the entry is simply the fill price. A prior
/// holding without a recorded entry is treated as bought at `price`.
pub fn weighted_average_entry(
    old_avg: Option<Decimal>,
    old_qty: Decimal,
    spent: Decimal,
    bought: Decimal,
    price: Decimal,
) -> Option<Decimal> {
    if old_qty <= Decimal::ZERO {
        return Some(price);
    }
    let new_qty = old_qty + bought;
    if new_qty <= Decimal::ZERO {
        return None;
    }
    let basis = old_avg.unwrap_or(price);
    Some((basis * old_qty + spent) / new_qty)
}

/// Split a buy evenly across the tracked assets.
pub fn even_split(usd: Decimal) -> AssetAmounts {
    let half = usd * dec!(0.5);
    PerAsset::new(half, usd - half)
}

/// Split `usd` across assets in proportion to their market value.
///
/// Returns all zeros when nothing is held.
pub fn value_weighted_split(usd: Decimal, values: &AssetAmounts) -> AssetAmounts {
    let total = values.btc.max(Decimal::ZERO) + values.eth.max(Decimal::ZERO);
    if total <= Decimal::ZERO || usd <= Decimal::ZERO {
        return AssetAmounts::default();
    }
    let btc = usd * values.btc.max(Decimal::ZERO) / total;
    PerAsset::new(btc, usd - btc)
}

/// Units of `asset` bought or sold for `usd` at `price`.
pub fn quantity_for(usd: Decimal, prices: &AssetAmounts, asset: Asset) -> Decimal {
    let price = *prices.get(asset);
    if price <= Decimal::ZERO || usd <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    usd / price
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_to_step() {
        assert_eq!(floor_to_step(dec!(49), dec!(50)), Decimal::ZERO);
        assert_eq!(floor_to_step(dec!(1124), dec!(50)), dec!(1100));
        assert_eq!(floor_to_step(dec!(1850), dec!(50)), dec!(1850));
        assert_eq!(floor_to_step(dec!(275), dec!(50)), dec!(250));
        assert_eq!(floor_to_step(dec!(-10), dec!(50)), Decimal::ZERO);
        assert_eq!(floor_to_step(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn test_weighted_average_entry() {
        // 0.01 @ 50_000 then 0.01 @ 30_000
        let first = weighted_average_entry(None, Decimal::ZERO, dec!(500), dec!(0.01), dec!(50000));
        assert_eq!(first, Some(dec!(50000)));

        let second = weighted_average_entry(first, dec!(0.01), dec!(300), dec!(0.01), dec!(30000));
        assert_eq!(second, Some(dec!(40000)));
    }

    #[test]
    fn test_splits() {
        let even = even_split(dec!(1100));
        assert_eq!(even.btc, dec!(550));
        assert_eq!(even.eth, dec!(550));

        let weighted = value_weighted_split(dec!(300), &PerAsset::new(dec!(200), dec!(100)));
        assert_eq!(weighted.btc, dec!(200));
        assert_eq!(weighted.eth, dec!(100));

        let nothing = value_weighted_split(dec!(300), &AssetAmounts::default());
        assert!(nothing.is_empty());
    }

    #[test]
    fn test_quantity_for_rejects_bad_price() {
        let prices = PerAsset::new(dec!(50000), Decimal::ZERO);
        assert_eq!(quantity_for(dec!(500), &prices, Asset::Btc), dec!(0.01));
        assert_eq!(quantity_for(dec!(500), &prices, Asset::Eth), Decimal::ZERO);
    }
}
