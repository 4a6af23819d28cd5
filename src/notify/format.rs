//! HTML rendering of run summaries for Telegram.

use std::fmt::Write;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{Asset, MarketSnapshot, PortfolioState, TradeAction, TradeSide};

/// `1234567.891` -> `1 234 567.89`
pub fn fmt_usd(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }

    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Six decimal places, as quantities are shown.
pub fn fmt_qty(quantity: Decimal) -> String {
    format!("{:.6}", quantity.round_dp(6))
}

/// Signed percentage of a fraction: `0.0234` -> `+2.34%`.
pub fn fmt_pct(fraction: Decimal) -> String {
    let pct = (fraction * Decimal::ONE_HUNDRED).round_dp(2);
    if pct.is_sign_negative() && !pct.is_zero() {
        format!("{:.2}%", pct)
    } else {
        format!("+{:.2}%", pct.abs())
    }
}

/// `amount` as a fraction of `base`, zero when there is no base.
pub fn pct_of(amount: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        amount / base
    }
}

/// One block per fired tier followed by the portfolio snapshot.
pub fn render_run_summary(
    actions: &[TradeAction],
    state: &PortfolioState,
    snapshot: &MarketSnapshot,
) -> String {
    let mut blocks: Vec<String> = Vec::new();

    for group in actions.chunk_by(|a, b| a.side == b.side && a.tier == b.tier) {
        let first = &group[0];
        let total: Decimal = group.iter().map(|a| a.usd_amount).sum();

        let (icon, title, verb) = match first.side {
            TradeSide::Buy => ("📉", "BUY signal: BTC and ETH", "bought"),
            TradeSide::Sell => ("📈", "SELL signal: BTC and ETH", "sold"),
        };

        let mut block = String::new();
        let _ = writeln!(block, "{} <b>{}</b>", icon, title);
        let _ = writeln!(
            block,
            "Tier: <b>{}</b>, Fear &amp; Greed now: <b>{}</b>",
            first.tier, first.sentiment
        );
        let _ = writeln!(block);
        let _ = write!(
            block,
            "Total: <b>{} $</b> ({} of base capital)",
            fmt_usd(total),
            fmt_pct(pct_of(total, state.base_capital))
        );
        for asset in Asset::ALL {
            let usd: Decimal = group
                .iter()
                .filter(|a| a.asset == asset)
                .map(|a| a.usd_amount)
                .sum();
            let _ = write!(block, "\n{}: {} ~<b>{} $</b>", asset, verb, fmt_usd(usd));
        }
        blocks.push(block);
    }

    let mut text = blocks.join("\n\n");
    text.push_str(&render_portfolio(state, snapshot));
    text
}

/// Cash, holdings at market, total, and entry prices.
fn render_portfolio(state: &PortfolioState, snapshot: &MarketSnapshot) -> String {
    let values = state.holdings.valued_at(&snapshot.prices);
    let total = state.total_value(&snapshot.prices);

    let mut out = String::from("\n\n💼 <b>Virtual portfolio</b>\n");
    let _ = writeln!(out, "Cash: <b>{} $</b>", fmt_usd(state.cash));
    for asset in Asset::ALL {
        let _ = writeln!(
            out,
            "{}: <b>{}</b> (~<b>{} $</b>)",
            asset,
            fmt_qty(*state.holdings.get(asset)),
            fmt_usd(*values.get(asset))
        );
    }
    let _ = write!(
        out,
        "Total: <b>{} $</b> ({} vs base {} $)",
        fmt_usd(total),
        fmt_pct(state.return_pct(&snapshot.prices)),
        fmt_usd(state.base_capital)
    );
    for asset in Asset::ALL {
        match state.avg_entry.get(asset) {
            Some(avg) => {
                let _ = write!(out, "\nAvg entry {}: <b>{} USDT</b>", asset, fmt_usd(*avg));
            }
            None => {
                let _ = write!(out, "\nAvg entry {}: —", asset);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PerAsset, Sentiment, Tier};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fmt_usd() {
        assert_eq!(fmt_usd(dec!(1234.5)), "1 234.50");
        assert_eq!(fmt_usd(dec!(1234567.891)), "1 234 567.89");
        assert_eq!(fmt_usd(dec!(999.999)), "1 000.00");
        assert_eq!(fmt_usd(dec!(-50)), "-50.00");
        assert_eq!(fmt_usd(Decimal::ZERO), "0.00");
    }

    #[test]
    fn test_fmt_pct() {
        assert_eq!(fmt_pct(dec!(0.0234)), "+2.34%");
        assert_eq!(fmt_pct(dec!(-0.1)), "-10.00%");
        assert_eq!(fmt_pct(Decimal::ZERO), "+0.00%");
    }

    fn buy(asset: Asset, usd: Decimal) -> TradeAction {
        TradeAction {
            side: TradeSide::Buy,
            tier: Tier(20),
            asset,
            sentiment: Sentiment::new(18).unwrap(),
            price: dec!(1),
            usd_amount: usd,
            quantity: usd,
            cash_after: dec!(8150),
            holding_after: usd,
            avg_entry_after: Some(dec!(1)),
            realized_pnl: None,
        }
    }

    #[test]
    fn test_run_summary_groups_by_tier() {
        let mut state = PortfolioState::new(dec!(10000), [], [], []);
        state.cash = dec!(8150);
        state.holdings = PerAsset::new(dec!(0.0185), dec!(0.37));
        state.avg_entry = PerAsset::new(Some(dec!(50000)), None);
        let snapshot = MarketSnapshot::new(
            Sentiment::new(18).unwrap(),
            Utc::now(),
            PerAsset::new(dec!(50000), dec!(2500)),
        );

        let text = render_run_summary(
            &[buy(Asset::Btc, dec!(925)), buy(Asset::Eth, dec!(925))],
            &state,
            &snapshot,
        );

        assert_eq!(text.matches("BUY signal").count(), 1);
        assert!(text.contains("Total: <b>1 850.00 $</b> (+18.50% of base capital)"));
        assert!(text.contains("BTC: bought ~<b>925.00 $</b>"));
        assert!(text.contains("Cash: <b>8 150.00 $</b>"));
        assert!(text.contains("BTC: <b>0.018500</b> (~<b>925.00 $</b>)"));
        assert!(text.contains("Total: <b>10 000.00 $</b> (+0.00% vs base 10 000.00 $)"));
        assert!(text.contains("Avg entry BTC: <b>50 000.00 USDT</b>"));
        assert!(text.contains("Avg entry ETH: —"));
    }
}
