//! Yearly report.

use std::fmt::Write;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::metrics::MetricsCalculator;
use crate::models::{Asset, AssetAmounts, IndexStats, PortfolioState};
use crate::notify::{fmt_pct, fmt_qty, fmt_usd, pct_of};

use super::{link_line, previous_year, ReportOutcome, Reporter, SentReport};

/// Report body for one calendar year. `prices` of zero value the holdings at
/// nothing, which is what happens when live prices are unavailable.
pub fn render_yearly(
    year: i32,
    stats: Option<&IndexStats>,
    pnl_usd: Decimal,
    base_capital: Decimal,
    state: &PortfolioState,
    prices: &AssetAmounts,
) -> String {
    let mut text = format!("📆 <b>{} results</b>\n", year);

    match stats {
        Some(stats) => {
            let _ = write!(
                text,
                "\n📊 <b>Fear &amp; Greed index</b>\n\
                 The {} low was <b>{}</b> on <b>{}</b>, the high <b>{}</b> on <b>{}</b>.\n\
                 Mean for the year: <b>{:.1}</b>.\n",
                year,
                stats.min,
                stats.min_at.format("%d.%m.%Y"),
                stats.max,
                stats.max_at.format("%d.%m.%Y"),
                stats.mean
            );
        }
        None => text.push_str("\n📊 Index statistics for the year are unavailable.\n"),
    }

    let _ = write!(
        text,
        "\n💰 <b>Financial result</b>\n\
         • PnL: <b>{} $</b> ({} of base {} $)\n\
         • Indicative only: slippage and exchange fees are not modelled.\n",
        fmt_usd(pnl_usd),
        fmt_pct(pct_of(pnl_usd, base_capital)),
        fmt_usd(base_capital),
    );

    let values = state.holdings.valued_at(prices);
    let total = state.total_value(prices);
    text.push_str("\n💼 <b>Virtual portfolio now</b>\n");
    let _ = writeln!(text, "Cash: <b>{} $</b>", fmt_usd(state.cash));
    for asset in Asset::ALL {
        let _ = writeln!(
            text,
            "{}: <b>{}</b> (~<b>{} $</b>)",
            asset,
            fmt_qty(*state.holdings.get(asset)),
            fmt_usd(*values.get(asset))
        );
    }
    let _ = write!(
        text,
        "Total value: <b>{} $</b> ({} vs base)",
        fmt_usd(total),
        fmt_pct(pct_of(total, base_capital) - Decimal::ONE)
    );

    text
}

impl Reporter {
    /// Report on the year before `today` and link every yearly report sent.
    pub async fn yearly(&self, today: NaiveDate) -> Result<ReportOutcome> {
        let year = previous_year(today);
        let base = self.base_capital();

        let monthly = self
            .db
            .meta_with_prefix::<SentReport>(&format!("monthly:{}-", year))
            .await?;
        let pnl_usd: Decimal = monthly.iter().map(|(_, report)| report.pnl_usd).sum();

        let first = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(today);
        let last = NaiveDate::from_ymd_opt(year, 12, 31).unwrap_or(today);
        let stats = match self.sentiment.history(first, last).await {
            Ok(readings) => MetricsCalculator::index_stats(&readings),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Index history unavailable for yearly report");
                None
            }
        };

        let state = self.db.load_state(&self.engine).await?;
        let prices = match self.prices.prices().await {
            Ok(prices) => prices,
            Err(e) => {
                warn!(error = %e, "Prices unavailable, valuing holdings at zero");
                AssetAmounts::default()
            }
        };

        let text = render_yearly(year, stats.as_ref(), pnl_usd, base, &state, &prices);
        let message_id = self.notifier.send(&text).await?;

        let key = format!("yearly:{}", year);
        let sent = SentReport {
            message_id,
            pnl_usd,
            pnl_pct: pct_of(pnl_usd, base),
        };
        self.db.put_meta(&key, &sent).await?;
        info!(
            key = %key,
            message_id,
            months = monthly.len(),
            index_days = stats.as_ref().map_or(0, |s| s.samples),
            "Yearly report sent"
        );

        let years = self.db.meta_with_prefix::<SentReport>("yearly:").await?;
        if !years.is_empty() {
            let mut links = String::from("🔗 <b>Yearly reports</b>");
            for (key, report) in &years {
                let label = key.trim_start_matches("yearly:");
                links.push('\n');
                links.push_str(&link_line(&self.notifier, report.message_id, label));
            }
            if let Err(e) = self.notifier.send(&links).await {
                warn!(error = %e, "Yearly links not delivered");
            }
        }

        Ok(ReportOutcome::Sent { message_id })
    }
}
