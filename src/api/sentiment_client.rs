//! CoinMarketCap Fear & Greed client.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder};
use tracing::debug;

use crate::error::RunError;
use crate::models::IndexReading;

use super::types::FearGreedResponse;

const CMC_API_BASE: &str = "https://pro-api.coinmarketcap.com";
const HISTORY_PATH: &str = "/v3/fear-and-greed/historical";
const LATEST_TIMEOUT: Duration = Duration::from_secs(15);
const HISTORY_TIMEOUT: Duration = Duration::from_secs(20);
const API_KEY_HEADER: &str = "X-CMC_PRO_API_KEY";

/// Client for the Fear & Greed index (read-only).
#[derive(Clone)]
pub struct SentimentClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SentimentClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, CMC_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(api_key: impl Into<String>, base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(LATEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Most recent published reading.
    pub async fn latest(&self) -> Result<IndexReading, RunError> {
        self.fetch_latest().await.map_err(RunError::data_unavailable)
    }

    async fn fetch_latest(&self) -> Result<IndexReading> {
        debug!("Fetching latest index value");

        let body = self.send(self.latest_request()).await?;
        let point = body
            .data
            .first()
            .context("Index response contained no data points")?;

        point.to_reading()
    }

    /// Daily readings with dates in `[start, end]`, oldest first.
    pub async fn history(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<IndexReading>> {
        debug!(start = %start, end = %end, "Fetching index history");

        let body = self.send(self.history_request(start, end)).await?;
        let mut readings = body
            .data
            .iter()
            .map(|p| p.to_reading())
            .collect::<Result<Vec<_>>>()
            .context("Malformed index history")?;

        readings.retain(|r| {
            let day = r.at.date_naive();
            day >= start && day <= end
        });
        readings.sort_by_key(|r| r.at);
        Ok(readings)
    }

    fn request(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .header(API_KEY_HEADER, &self.api_key)
            .header("Accept", "application/json")
    }

    fn latest_request(&self) -> RequestBuilder {
        self.request(&format!("{}{}?limit=1", self.base_url, HISTORY_PATH))
    }

    /// Range queries are slower than the latest point and get a longer timeout.
    fn history_request(&self, start: NaiveDate, end: NaiveDate) -> RequestBuilder {
        // The upper bound is exclusive on the provider side
        let end_exclusive = end.succ_opt().unwrap_or(end);
        let url = format!(
            "{}{}?start={}&end={}&interval=daily",
            self.base_url,
            HISTORY_PATH,
            start.format("%Y-%m-%d"),
            end_exclusive.format("%Y-%m-%d"),
        );
        self.request(&url).timeout(HISTORY_TIMEOUT)
    }

    async fn send(&self, request: RequestBuilder) -> Result<FearGreedResponse> {
        let response = request
            .send()
            .await
            .context("Failed to fetch Fear & Greed index")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Fear & Greed request failed: {} - {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse Fear & Greed response")
    }
}
