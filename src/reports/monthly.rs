//! Monthly report: index movement, strategy activity, realized PnL.

use std::fmt::Write;

use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::metrics::MetricsCalculator;
use crate::models::{IndexStats, IndexTrend, LedgerSummary};
use crate::notify::{fmt_pct, fmt_usd};

use super::{day_start, link_line, month_name, MonthPeriod, ReportOutcome, Reporter, SentReport};

/// Report body for one month.
pub fn render_monthly(
    period: &MonthPeriod,
    stats: Option<&IndexStats>,
    summary: &LedgerSummary,
    base_capital: Decimal,
) -> String {
    let mut text = format!("📆 <b>{} {} results</b>\n", period.name(), period.year);

    match stats {
        Some(stats) => {
            let trend = match stats.trend() {
                IndexTrend::Rose => "rose",
                IndexTrend::Fell => "fell",
                IndexTrend::Flat => "was flat",
            };
            let _ = write!(
                text,
                "\n📊 <b>Fear &amp; Greed index</b>\n\
                 Over the month the index {} from <b>{}</b> to <b>{}</b>.\n\
                 Low: <b>{}</b>, high: <b>{}</b>, mean: <b>{:.1}</b>.\n",
                trend, stats.first, stats.last, stats.min, stats.max, stats.mean
            );
        }
        None => text.push_str("\n📊 Index statistics for the month are unavailable.\n"),
    }

    let _ = write!(
        text,
        "\n💼 <b>Strategy activity</b>\n\
         Trades: <b>{}</b>\n\
         Buys (BTC and ETH): <b>{}</b>, ~<b>{} $</b>\n\
         Sells (BTC and ETH): <b>{}</b>, ~<b>{} $</b>\n",
        summary.total_legs,
        summary.buy_legs,
        fmt_usd(summary.bought_usd),
        summary.sell_legs,
        fmt_usd(summary.sold_usd),
    );

    let _ = write!(
        text,
        "\n💰 <b>Result for {}</b>\n\
         • Realized PnL: <b>{} $</b> ({} of base {} $)\n\
         • Indicative only: slippage and exchange fees are not modelled.",
        period.name(),
        fmt_usd(summary.realized_pnl),
        fmt_pct(summary.pnl_pct(base_capital)),
        fmt_usd(base_capital),
    );

    text
}

impl Reporter {
    /// Report on the month before `today` and link the year's reports.
    pub async fn monthly(&self, today: NaiveDate) -> Result<ReportOutcome> {
        let period = MonthPeriod::previous(today);
        let base = self.base_capital();

        let end = period.last_day.succ_opt().unwrap_or(period.last_day);
        let trades = self.db.trades_between(day_start(period.first_day), day_start(end)).await?;
        let summary = MetricsCalculator::ledger_summary(&trades);

        let stats = match self.sentiment.history(period.first_day, period.last_day).await {
            Ok(readings) => MetricsCalculator::index_stats(&readings),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Index history unavailable for monthly report");
                None
            }
        };

        let text = render_monthly(&period, stats.as_ref(), &summary, base);
        let message_id = self.notifier.send(&text).await?;

        let sent = SentReport {
            message_id,
            pnl_usd: summary.realized_pnl,
            pnl_pct: summary.pnl_pct(base),
        };
        self.db.put_meta(&period.key(), &sent).await?;
        info!(key = %period.key(), message_id, "Monthly report sent");

        let year_prefix = format!("monthly:{}-", period.year);
        let sent_this_year = self.db.meta_with_prefix::<SentReport>(&year_prefix).await?;
        if !sent_this_year.is_empty() {
            let mut links = String::from("🔗 <b>Reports this year</b>");
            for (key, report) in &sent_this_year {
                let month = key
                    .strip_prefix(&year_prefix)
                    .and_then(|m| m.parse::<u32>().ok())
                    .unwrap_or(0);
                let label = format!("{} {}", month_name(month), period.year);
                links.push('\n');
                links.push_str(&link_line(&self.notifier, report.message_id, &label));
            }
            if let Err(e) = self.notifier.send(&links).await {
                warn!(error = %e, "Monthly links not delivered");
            }
        }

        Ok(ReportOutcome::Sent { message_id })
    }
}
