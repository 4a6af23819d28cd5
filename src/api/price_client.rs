//! CoinGecko spot price client.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::RunError;
use crate::models::{Asset, AssetAmounts, PerAsset};

use super::types::SimplePriceResponse;

const COINGECKO_API_BASE: &str = "https://api.coingecko.com/api/v3";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client for USD spot prices (no key required).
#[derive(Clone)]
pub struct PriceClient {
    client: Client,
    base_url: String,
}

impl PriceClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(COINGECKO_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Current USD price of `asset`.
    pub async fn price(&self, asset: Asset) -> Result<Decimal, RunError> {
        self.fetch_price(asset).await.map_err(RunError::data_unavailable)
    }

    /// Both tracked prices, fetched concurrently.
    pub async fn prices(&self) -> Result<AssetAmounts, RunError> {
        let (btc, eth) = futures::future::try_join(self.price(Asset::Btc), self.price(Asset::Eth)).await?;
        Ok(PerAsset::new(btc, eth))
    }

    async fn fetch_price(&self, asset: Asset) -> Result<Decimal> {
        let coin = asset.coingecko_id();
        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, coin
        );
        debug!(url = %url, asset = %asset, "Fetching spot price");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {} price", asset))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("{} price request failed: {} - {}", asset, status, body);
        }

        let body: SimplePriceResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} price response", asset))?;

        let price = body
            .get(coin)
            .and_then(|quote| quote.usd)
            .with_context(|| format!("{} price missing from response", asset))?;

        if price <= Decimal::ZERO {
            anyhow::bail!("{} price must be positive, got {}", asset, price);
        }

        Ok(price)
    }
}
