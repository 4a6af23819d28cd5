//! Response types for the CoinMarketCap and CoinGecko APIs.

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::models::{IndexReading, Sentiment};

/// Body of `/v3/fear-and-greed/historical`.
#[derive(Debug, Clone, Deserialize)]
pub struct FearGreedResponse {
    #[serde(default)]
    pub data: Vec<FearGreedPoint>,
}

/// One index point. CMC has shipped both numeric and string encodings.
#[derive(Debug, Clone, Deserialize)]
pub struct FearGreedPoint {
    pub value: Scalar,
    #[serde(default)]
    pub timestamp: Option<Scalar>,
}

/// A JSON number or string.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(v) => Some(*v),
            Scalar::Float(v) if v.is_finite() => Some(v.trunc() as i64),
            Scalar::Float(_) => None,
            Scalar::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
            }
        }
    }
}

impl FearGreedPoint {
    /// Validate the point into a reading.
    pub fn to_reading(&self) -> Result<IndexReading> {
        let raw = self
            .value
            .as_i64()
            .ok_or_else(|| anyhow!("Index value {:?} is not a number", self.value))?;
        let value = Sentiment::new(raw).ok_or_else(|| anyhow!("Index value {} is outside 0..=100", raw))?;

        let timestamp = self
            .timestamp
            .as_ref()
            .ok_or_else(|| anyhow!("Index point has no timestamp"))?;
        let at = parse_timestamp(timestamp)?;

        Ok(IndexReading { value, at })
    }
}

/// Accept Unix seconds (numeric or digit string) and ISO-8601 forms.
pub fn parse_timestamp(raw: &Scalar) -> Result<DateTime<Utc>> {
    match raw {
        Scalar::Int(secs) => unix_seconds(*secs),
        Scalar::Float(secs) => unix_seconds(secs.trunc() as i64),
        Scalar::Text(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                let secs = s.parse::<i64>().context("Timestamp out of range")?;
                return unix_seconds(secs);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                return Ok(naive.and_utc());
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Ok(date.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc());
            }
            Err(anyhow!("Unrecognized timestamp format: {}", s))
        }
    }
}

fn unix_seconds(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| anyhow!("Invalid Unix timestamp {}", secs))
}

/// USD quote of one coin from `/simple/price`.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinQuote {
    #[serde(default)]
    pub usd: Option<Decimal>,
}

/// Body of `/simple/price`, keyed by coin id.
pub type SimplePriceResponse = HashMap<String, CoinQuote>;

/// Body of Telegram `sendMessage`.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramResponse {
    pub ok: bool,
    #[serde(default)]
    pub result: Option<TelegramMessage>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
}
