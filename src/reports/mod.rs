//! Periodic Telegram reports built from the ledger, the index history, and
//! the stored portfolio.

mod inactivity;
mod monthly;
mod yearly;

use anyhow::Result;
use chrono::{DateTime, Datelike, Month, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::{PriceClient, SentimentClient};
use crate::config::AppConfig;
use crate::db::Database;
use crate::notify::TelegramNotifier;
use crate::trading::LadderEngine;

/// Bookkeeping stored for a delivered monthly or yearly report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentReport {
    pub message_id: i64,
    #[serde(default)]
    pub pnl_usd: Decimal,
    #[serde(default)]
    pub pnl_pct: Decimal,
}

/// Result of a report command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Sent { message_id: i64 },
    Skipped(String),
}

/// A calendar month with inclusive day bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthPeriod {
    pub year: i32,
    pub month: u32,
    pub first_day: NaiveDate,
    pub last_day: NaiveDate,
}

impl MonthPeriod {
    /// The month before the one containing `today`.
    pub fn previous(today: NaiveDate) -> Self {
        let (year, month) = if today.month() == 1 {
            (today.year() - 1, 12)
        } else {
            (today.year(), today.month() - 1)
        };
        Self::of(year, month)
    }

    pub fn of(year: i32, month: u32) -> Self {
        let first_day = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN);
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        };
        let last_day = next.and_then(|d| d.pred_opt()).unwrap_or(first_day);
        Self {
            year,
            month,
            first_day,
            last_day,
        }
    }

    /// Meta key, e.g. `monthly:2024-05`.
    pub fn key(&self) -> String {
        format!("monthly:{}-{:02}", self.year, self.month)
    }

    pub fn name(&self) -> &'static str {
        month_name(self.month)
    }
}

pub fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or("?")
}

/// The year before the one containing `today`.
pub fn previous_year(today: NaiveDate) -> i32 {
    today.year() - 1
}

/// Midnight UTC at the start of `date`.
pub fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
}

fn link_line(notifier: &TelegramNotifier, message_id: i64, label: &str) -> String {
    format!(
        "• <a href=\"{}\">{}</a>",
        notifier.message_link(message_id),
        label
    )
}

/// Builds and sends reports.
pub struct Reporter {
    engine: LadderEngine,
    db: Database,
    sentiment: SentimentClient,
    prices: PriceClient,
    notifier: TelegramNotifier,
}

impl Reporter {
    pub fn new(engine: LadderEngine, db: Database, config: &AppConfig) -> Result<Self> {
        Ok(Self::from_parts(
            engine,
            db,
            config.sentiment_client()?,
            config.price_client()?,
            config.notifier()?,
        ))
    }

    pub fn from_parts(
        engine: LadderEngine,
        db: Database,
        sentiment: SentimentClient,
        prices: PriceClient,
        notifier: TelegramNotifier,
    ) -> Self {
        Self {
            engine,
            db,
            sentiment,
            prices,
            notifier,
        }
    }

    fn base_capital(&self) -> Decimal {
        self.engine.config().base_capital
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_previous_month_bounds() {
        let may = MonthPeriod::previous(date(2024, 6, 1));
        assert_eq!((may.year, may.month), (2024, 5));
        assert_eq!(may.first_day, date(2024, 5, 1));
        assert_eq!(may.last_day, date(2024, 5, 31));
        assert_eq!(may.key(), "monthly:2024-05");
        assert_eq!(may.name(), "May");

        let december = MonthPeriod::previous(date(2025, 1, 15));
        assert_eq!((december.year, december.month), (2024, 12));
        assert_eq!(december.last_day, date(2024, 12, 31));

        let february = MonthPeriod::previous(date(2024, 3, 2));
        assert_eq!(february.last_day, date(2024, 2, 29));
    }

    #[test]
    fn test_previous_year() {
        assert_eq!(previous_year(date(2025, 1, 1)), 2024);
    }
}
