//! Telegram Bot API client for operator notifications.

use std::fmt::Debug;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, instrument};

/// Default Telegram Bot API endpoint.
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Outbound chat channel.
#[async_trait]
pub trait Notifier: Send + Sync + Debug {
    /// Deliver an HTML-formatted message.
    async fn send(&self, text: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
}

/// Telegram `sendMessage` client for a single chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    token: String,
    chat_id: i64,
}

impl Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("base_url", &self.base_url)
            .field("chat_id", &self.chat_id)
            .finish_non_exhaustive()
    }
}

impl TelegramNotifier {
    /// Create a notifier for `chat_id` using bot `token`.
    pub fn new(token: impl Into<String>, chat_id: i64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: TELEGRAM_API_URL.to_string(),
            token: token.into(),
            chat_id,
        }
    }

    /// Point the client at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    #[instrument(skip_all, fields(chat_id = self.chat_id))]
    async fn send(&self, text: &str) -> Result<()> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let payload = SendMessage {
            chat_id: self.chat_id,
            text,
            parse_mode: "HTML",
        };

        // Strip the URL from errors so the bot token never reaches the logs.
        let response = self
            .client
            .post(&url)
            .timeout(SEND_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| e.without_url())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram API error (HTTP {}): {}", status.as_u16(), body);
        }

        debug!(preview = %text.chars().take(50).collect::<String>(), "Telegram notification sent");
        Ok(())
    }
}
