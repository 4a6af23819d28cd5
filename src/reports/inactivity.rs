//! Quiet-week notice, sent when the ladder has not traded for a while.

use std::fmt::Write;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::MetricsCalculator;
use crate::notify::{fmt_pct, fmt_usd};
use crate::trading::{Ladder, StrategyConfig};

use super::{ReportOutcome, Reporter};

/// Minimum quiet period, and minimum spacing between notices.
pub const INACTIVITY_DAYS: i64 = 7;

const LAST_SENT_KEY: &str = "inactivity:last";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InactivityMark {
    sent_at: DateTime<Utc>,
}

/// The standing ladder as a bullet list.
pub fn render_plan(config: &StrategyConfig) -> String {
    let mut lines = Vec::new();

    match &config.ladder {
        Ladder::Bucketed { buy, .. } => {
            for tier in buy {
                lines.push(format!(
                    "• at F&amp;G ≤ {} top the bucket up to {} $;",
                    tier.level,
                    fmt_usd(tier.target_usd)
                ));
            }
        }
        Ladder::PositionFraction { buy, .. } => {
            for tier in buy {
                lines.push(format!(
                    "• at F&amp;G ≤ {} spend {} of remaining cash;",
                    tier.level,
                    fmt_pct(tier.cash_fraction).trim_start_matches('+')
                ));
            }
        }
    }

    for tier in config.ladder.sell_tiers() {
        lines.push(format!(
            "• at F&amp;G ≥ {} sell {} of the position;",
            tier.level,
            fmt_pct(tier.fraction).trim_start_matches('+')
        ));
    }

    if let Some(exit) = config.full_exit {
        lines.push(format!("• at F&amp;G ≥ {} exit the virtual position entirely.", exit));
    }

    lines.join("\n")
}

/// Notice body. `range` is the index low and high over the quiet week.
pub fn render_inactivity(range: Option<(u8, u8)>, plan: &str) -> String {
    let mut text = String::from("😴 <b>The strategy has been quiet for a week, and that is fine</b>\n\n");

    match range {
        Some((low, high)) => {
            let _ = writeln!(
                text,
                "Over the last {} days the Fear &amp; Greed index moved between <b>{}</b> and <b>{}</b>.",
                INACTIVITY_DAYS, low, high
            );
        }
        None => {
            let _ = writeln!(
                text,
                "Full index data for the last {} days is unavailable.",
                INACTIVITY_DAYS
            );
        }
    }

    text.push_str(
        "The market shows neither deep fear nor clear greed, so the model opens no new \
         virtual BTC and ETH trades.\n\nThe plan is unchanged:\n",
    );
    text.push_str(plan);
    text.push_str("\n\nSignals will appear in the channel as soon as they fire.");
    text
}

impl Reporter {
    /// Send the quiet-week notice when the ledger has gone silent.
    pub async fn inactivity(&self, now: DateTime<Utc>) -> Result<ReportOutcome> {
        let today = now.date_naive();

        let Some(last_trade) = self.db.last_trade_at().await? else {
            info!("No trades recorded, inactivity notice not needed");
            return Ok(ReportOutcome::Skipped("no trades recorded".to_string()));
        };

        let quiet_days = (today - last_trade.date_naive()).num_days();
        if quiet_days < INACTIVITY_DAYS {
            info!(quiet_days, "Recent trades, inactivity notice not needed");
            return Ok(ReportOutcome::Skipped(format!("last trade {} days ago", quiet_days)));
        }

        if let Some(mark) = self.db.get_meta::<InactivityMark>(LAST_SENT_KEY).await? {
            let since = (today - mark.sent_at.date_naive()).num_days();
            if since < INACTIVITY_DAYS {
                info!(since, "Inactivity notice already sent recently");
                return Ok(ReportOutcome::Skipped(format!("notice sent {} days ago", since)));
            }
        }

        let start = today - Duration::days(INACTIVITY_DAYS);
        let range = match self.sentiment.history(start, today).await {
            Ok(readings) => MetricsCalculator::index_stats(&readings).map(|s| (s.min, s.max)),
            Err(e) => {
                warn!(error = %format!("{:#}", e), "Index history unavailable for inactivity notice");
                None
            }
        };

        let text = render_inactivity(range, &render_plan(self.engine.config()));
        let message_id = self.notifier.send(&text).await?;

        self.db
            .put_meta(LAST_SENT_KEY, &InactivityMark { sent_at: now })
            .await?;
        info!(message_id, quiet_days, "Inactivity notice sent");

        Ok(ReportOutcome::Sent { message_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{PriceClient, SentimentClient};
    use crate::db::Database;
    use crate::models::{Asset, Sentiment, Tier, TradeAction, TradeSide};
    use crate::notify::TelegramNotifier;
    use crate::trading::{LadderEngine, ReleaseTier, SpendTier};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_render_plan_default_ladder() {
        let plan = render_plan(&StrategyConfig::default());
        assert!(plan.starts_with("• at F&amp;G ≤ 40 top the bucket up to 1 100.00 $;"));
        assert!(plan.contains("• at F&amp;G ≥ 60 sell 25.00% of the position;"));
        assert!(plan.ends_with("• at F&amp;G ≥ 75 sell 25.00% of the position;"));
        assert!(!plan.contains("exit the virtual position"));
    }

    #[test]
    fn test_render_plan_with_full_exit() {
        let config = StrategyConfig {
            full_exit: Some(Tier(85)),
            ..StrategyConfig::default()
        };
        let plan = render_plan(&config);
        assert!(plan.ends_with("• at F&amp;G ≥ 85 exit the virtual position entirely."));
    }

    #[test]
    fn test_render_plan_position_fraction() {
        let config = StrategyConfig {
            ladder: Ladder::PositionFraction {
                buy: vec![SpendTier {
                    level: Tier(20),
                    cash_fraction: dec!(0.5),
                }],
                sell: vec![ReleaseTier {
                    level: Tier(80),
                    fraction: Decimal::ONE,
                }],
            },
            full_exit: None,
            ..StrategyConfig::default()
        };
        let plan = render_plan(&config);
        assert_eq!(
            plan,
            "• at F&amp;G ≤ 20 spend 50.00% of remaining cash;\n\
             • at F&amp;G ≥ 80 sell 100.00% of the position;"
        );
    }

    #[test]
    fn test_render_inactivity() {
        let with_range = render_inactivity(Some((38, 52)), "• plan");
        assert!(with_range.contains("between <b>38</b> and <b>52</b>"));
        assert!(with_range.ends_with("as soon as they fire."));

        let without = render_inactivity(None, "• plan");
        assert!(without.contains("unavailable"));
    }

    async fn reporter_with_trade(server: &MockServer, traded_at: DateTime<Utc>) -> Reporter {
        let engine = LadderEngine::new(StrategyConfig::default()).unwrap();
        let db = Database::new("sqlite::memory:").await.unwrap();
        let buy = TradeAction {
            side: TradeSide::Buy,
            tier: Tier(40),
            asset: Asset::Eth,
            sentiment: Sentiment::new(39).unwrap(),
            price: dec!(2500),
            usd_amount: dec!(550),
            quantity: dec!(0.22),
            cash_after: dec!(9450),
            holding_after: dec!(0.22),
            avg_entry_after: Some(dec!(2500)),
            realized_pnl: None,
        };
        db.commit_run(&engine.bootstrap_state(), &[buy], traded_at, "r").await.unwrap();

        Reporter::from_parts(
            engine,
            db,
            SentimentClient::with_base_url("k", server.uri()).unwrap(),
            PriceClient::with_base_url(server.uri()).unwrap(),
            TelegramNotifier::with_base_url("T", "@chan", server.uri()).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_inactivity_sends_once_per_week() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v3/fear-and-greed/historical"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"value": 41, "timestamp": "2024-06-10T00:00:00Z"},
                    {"value": 55, "timestamp": "2024-06-12T00:00:00Z"}
                ]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/botT/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 5}})))
            .expect(1)
            .mount(&server)
            .await;

        let traded = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let reporter = reporter_with_trade(&server, traded).await;

        let now = Utc.with_ymd_and_hms(2024, 6, 14, 9, 0, 0).unwrap();
        assert_eq!(reporter.inactivity(now).await.unwrap(), ReportOutcome::Sent { message_id: 5 });

        let again = now + Duration::days(3);
        assert!(matches!(reporter.inactivity(again).await.unwrap(), ReportOutcome::Skipped(_)));
    }

    #[tokio::test]
    async fn test_inactivity_skips_recent_trades() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botT/sendMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": {"message_id": 5}})))
            .expect(0)
            .mount(&server)
            .await;

        let traded = Utc.with_ymd_and_hms(2024, 6, 10, 8, 0, 0).unwrap();
        let reporter = reporter_with_trade(&server, traded).await;

        let now = Utc.with_ymd_and_hms(2024, 6, 14, 9, 0, 0).unwrap();
        assert_eq!(
            reporter.inactivity(now).await.unwrap(),
            ReportOutcome::Skipped("last trade 4 days ago".to_string())
        );
    }

    #[tokio::test]
    async fn test_inactivity_skips_empty_ledger() {
        let server = MockServer::start().await;
        let engine = LadderEngine::new(StrategyConfig::default()).unwrap();
        let db = Database::new("sqlite::memory:").await.unwrap();
        let reporter = Reporter::from_parts(
            engine,
            db,
            SentimentClient::with_base_url("k", server.uri()).unwrap(),
            PriceClient::with_base_url(server.uri()).unwrap(),
            TelegramNotifier::with_base_url("T", "@chan", server.uri()).unwrap(),
        );

        let outcome = reporter.inactivity(Utc::now()).await.unwrap();
        assert_eq!(outcome, ReportOutcome::Skipped("no trades recorded".to_string()));
    }
}
