//! Telegram Bot API: outbound `sendMessage` and the inbound webhook payload.

use std::time::Duration;

use ambient_core::{Messenger, MessagingError, UserId};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::split::{split_message, MAX_MESSAGE_CHARS};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An incoming webhook update. Only text messages are acted on.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub from: Option<Sender>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Sender {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

impl Update {
    /// `(user id, chat id, text)` for a text message from a user.
    pub fn text_message(&self) -> Option<(UserId, i64, &str)> {
        let message = self.message.as_ref()?;
        let from = message.from.as_ref()?;
        let text = message.text.as_deref()?;
        Some((from.id, message.chat.id, text))
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

pub struct TelegramMessenger {
    client: Client,
    token: SecretString,
    api_base: String,
}

impl TelegramMessenger {
    pub fn new(token: SecretString, api_base: Option<String>) -> Result<Self, MessagingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| MessagingError::Network(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            token,
            api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/bot{}/sendMessage",
            self.api_base.trim_end_matches('/'),
            self.token.expose_secret()
        )
    }

    async fn send_chunk(&self, chat_id: i64, text: &str) -> Result<(), MessagingError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&SendMessage { chat_id, text })
            .send()
            .await
            .map_err(|e| MessagingError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    /// Private chats share the user's id, so the user id doubles as chat id.
    async fn send(&self, user_id: UserId, text: &str) -> Result<(), MessagingError> {
        let chunks = split_message(text, MAX_MESSAGE_CHARS);
        debug!(user_id, chunks = chunks.len(), "sending telegram message");
        for chunk in &chunks {
            self.send_chunk(user_id, chunk).await?;
        }
        Ok(())
    }
}

/// Stand-in used when no bot token is configured.
pub struct DisabledMessenger;

#[async_trait]
impl Messenger for DisabledMessenger {
    async fn send(&self, _user_id: UserId, _text: &str) -> Result<(), MessagingError> {
        Err(MessagingError::NotConfigured)
    }
}
