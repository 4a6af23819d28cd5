//! HTTP clients for market data: sentiment index and spot prices.

mod price_client;
mod sentiment_client;
mod types;

pub use price_client::PriceClient;
pub use sentiment_client::SentimentClient;
pub use types::TelegramResponse;

use crate::error::RunError;
use crate::models::{Asset, MarketSnapshot, PerAsset};

/// Fetch the index and both prices concurrently; the first failure wins.
pub async fn fetch_snapshot(
    sentiment: &SentimentClient,
    prices: &PriceClient,
) -> Result<MarketSnapshot, RunError> {
    let (reading, btc, eth) = futures::future::try_join3(
        sentiment.latest(),
        prices.price(Asset::Btc),
        prices.price(Asset::Eth),
    )
    .await?;

    Ok(MarketSnapshot::new(
        reading.value,
        reading.at,
        PerAsset::new(btc, eth),
    ))
}
