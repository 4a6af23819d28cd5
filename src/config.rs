//! Credentials and endpoints read from the environment.

use anyhow::Result;

use crate::api::{PriceClient, SentimentClient};
use crate::error::RunError;
use crate::notify::TelegramNotifier;

pub const CMC_API_KEY: &str = "CMC_API_KEY";
pub const TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const TELEGRAM_CHAT_ID: &str = "TELEGRAM_CHAT_ID";

const CMC_BASE_URL: &str = "FNG_CMC_BASE_URL";
const COINGECKO_BASE_URL: &str = "FNG_COINGECKO_BASE_URL";
const TELEGRAM_BASE_URL: &str = "FNG_TELEGRAM_BASE_URL";

/// Runtime configuration for networked commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub cmc_api_key: String,
    pub telegram_bot_token: String,
    pub telegram_chat_id: String,

    /// Endpoint overrides, mainly for staging and tests
    pub cmc_base_url: Option<String>,
    pub coingecko_base_url: Option<String>,
    pub telegram_base_url: Option<String>,
}

impl AppConfig {
    /// Read from process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, RunError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read through an arbitrary lookup. Blank values count as missing, and
    /// every missing variable is reported at once.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, RunError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = [CMC_API_KEY, TELEGRAM_BOT_TOKEN, TELEGRAM_CHAT_ID];
        let missing: Vec<String> = required
            .iter()
            .filter(|key| get(key).is_none())
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(RunError::MissingConfig(missing));
        }

        Ok(Self {
            cmc_api_key: get(CMC_API_KEY).unwrap_or_default(),
            telegram_bot_token: get(TELEGRAM_BOT_TOKEN).unwrap_or_default(),
            telegram_chat_id: get(TELEGRAM_CHAT_ID).unwrap_or_default(),
            cmc_base_url: get(CMC_BASE_URL),
            coingecko_base_url: get(COINGECKO_BASE_URL),
            telegram_base_url: get(TELEGRAM_BASE_URL),
        })
    }

    pub fn sentiment_client(&self) -> Result<SentimentClient> {
        match &self.cmc_base_url {
            Some(url) => SentimentClient::with_base_url(&self.cmc_api_key, url.clone()),
            None => SentimentClient::new(&self.cmc_api_key),
        }
    }

    pub fn price_client(&self) -> Result<PriceClient> {
        match &self.coingecko_base_url {
            Some(url) => PriceClient::with_base_url(url.clone()),
            None => PriceClient::new(),
        }
    }

    pub fn notifier(&self) -> Result<TelegramNotifier> {
        match &self.telegram_base_url {
            Some(url) => TelegramNotifier::with_base_url(
                &self.telegram_bot_token,
                &self.telegram_chat_id,
                url.clone(),
            ),
            None => TelegramNotifier::new(&self.telegram_bot_token, &self.telegram_chat_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_reports_every_missing_variable() {
        let err = AppConfig::from_lookup(lookup(&[(CMC_API_KEY, "k"), (TELEGRAM_CHAT_ID, "  ")])).unwrap_err();
        match err {
            RunError::MissingConfig(missing) => {
                assert_eq!(missing, vec![TELEGRAM_BOT_TOKEN.to_string(), TELEGRAM_CHAT_ID.to_string()]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_reads_credentials_and_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            (CMC_API_KEY, "k"),
            (TELEGRAM_BOT_TOKEN, "t"),
            (TELEGRAM_CHAT_ID, "@chan"),
            (COINGECKO_BASE_URL, "http://localhost:9999"),
        ]))
        .unwrap();

        assert_eq!(config.telegram_chat_id, "@chan");
        assert_eq!(config.coingecko_base_url.as_deref(), Some("http://localhost:9999"));
        assert!(config.cmc_base_url.is_none());
        assert!(config.price_client().is_ok());
    }
}
