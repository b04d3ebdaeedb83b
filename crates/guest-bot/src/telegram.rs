//! Long-polling Telegram Bot API client.
//!
//! Thin reqwest bridge over the three calls the bot needs: `getUpdates`,
//! `sendMessage`, and `deleteWebhook` (dropped pending updates on startup so
//! a restart never replays a backlog at guests). Implements
//! [`concierge::ChatTransport`] for the router.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;

use concierge::{ChatId, ChatTransport, ConciergeError};

/// Extra slack on top of the long-poll timeout before reqwest gives up.
const HTTP_SLACK_SECS: u64 = 10;

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// One update from `getUpdates`.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub reply_to_message: Option<Box<Message>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// Bot identity from `getMe`.
#[derive(Debug, Clone, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    pub username: Option<String>,
}

pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
}

impl TelegramClient {
    pub fn new(token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("https://api.telegram.org/bot{token}"),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base, method);
        let envelope: ApiEnvelope<T> = self
            .http
            .post(&url)
            .timeout(timeout)
            .json(params)
            .send()
            .await
            .with_context(|| format!("Telegram {method} request failed"))?
            .json()
            .await
            .with_context(|| format!("Telegram {method} returned malformed JSON"))?;

        if !envelope.ok {
            return Err(ConciergeError::Transport(format!(
                "Telegram {method} error: {}",
                envelope.description.unwrap_or_else(|| "unknown".into())
            ))
            .into());
        }
        envelope
            .result
            .with_context(|| format!("Telegram {method} returned ok without result"))
    }

    /// Verify the token and fetch the bot identity.
    pub async fn get_me(&self) -> Result<BotIdentity> {
        self.call("getMe", &json!({}), Duration::from_secs(10)).await
    }

    /// Clear any webhook so long polling receives updates.
    pub async fn delete_webhook(&self, drop_pending_updates: bool) -> Result<()> {
        let _: bool = self
            .call(
                "deleteWebhook",
                &json!({ "drop_pending_updates": drop_pending_updates }),
                Duration::from_secs(10),
            )
            .await?;
        Ok(())
    }

    /// Long-poll for updates past `offset`.
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
            Duration::from_secs(timeout_secs + HTTP_SLACK_SECS),
        )
        .await
    }

    /// Send a message, optionally as a reply; returns the sent message.
    pub async fn send(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<Message> {
        let mut params = json!({ "chat_id": chat_id, "text": text });
        if let Some(id) = reply_to {
            params["reply_to_message_id"] = json!(id);
        }
        self.call("sendMessage", &params, Duration::from_secs(15)).await
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(&self, chat: ChatId, text: &str) -> Result<i64> {
        let message = self.send(chat.0, text, None).await?;
        Ok(message.message_id)
    }

    async fn reply_message(&self, chat: ChatId, reply_to: i64, text: &str) -> Result<()> {
        self.send(chat.0, text, Some(reply_to)).await?;
        Ok(())
    }
}
