//! Telegram Bot API client.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::api::TelegramResponse;
use crate::error::RunError;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Sends HTML messages to one chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self> {
        Self::with_base_url(token, chat_id, TELEGRAM_API_BASE.to_string())
    }

    /// Create with custom base URL (for testing).
    pub fn with_base_url(
        token: impl Into<String>,
        chat_id: impl Into<String>,
        base_url: String,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            chat_id: chat_id.into(),
        })
    }

    /// Send `text` and return the new message id.
    pub async fn send(&self, text: &str) -> Result<i64, RunError> {
        self.post_message(text)
            .await
            .map_err(|e| RunError::NotificationFailure(format!("{:#}", e)))
    }

    async fn post_message(&self, text: &str) -> Result<i64> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        debug!(chat_id = %self.chat_id, chars = text.len(), "Sending Telegram message");

        let request = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach Telegram")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram request failed: {} - {}", status, body);
        }

        let body: TelegramResponse = response
            .json()
            .await
            .context("Failed to parse Telegram response")?;

        if !body.ok {
            anyhow::bail!(
                "Telegram rejected message: {}",
                body.description.unwrap_or_default()
            );
        }

        body.result
            .map(|m| m.message_id)
            .context("Telegram response has no message id")
    }

    /// Public link to a message in this chat.
    pub fn message_link(&self, message_id: i64) -> String {
        format!(
            "https://t.me/{}/{}",
            self.chat_id.trim_start_matches('@'),
            message_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": "@fng_channel",
                "text": "<b>hi</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 42}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::with_base_url("TOKEN", "@fng_channel", server.uri()).unwrap();
        assert_eq!(notifier.send("<b>hi</b>").await.unwrap(), 42);
        assert_eq!(notifier.message_link(42), "https://t.me/fng_channel/42");
    }

    #[tokio::test]
    async fn test_send_failure_is_notification_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "description": "Bad Request: chat not found"
            })))
            .mount(&server)
            .await;

        let notifier = TelegramNotifier::with_base_url("TOKEN", "1", server.uri()).unwrap();
        let err = notifier.send("x").await.unwrap_err();
        assert!(matches!(err, RunError::NotificationFailure(_)));
        assert!(err.to_string().contains("chat not found"));
    }
}
