use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::app::SendError;
use crate::config::{ChatConfig, DeliveryConfig};

/// Per-message rendering flags passed to the chat platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageOptions {
    pub parse_mode: String,
    pub disable_web_page_preview: bool,
    /// Deliver without sound.
    pub silent: bool,
}

impl MessageOptions {
    pub fn from_config(config: &DeliveryConfig, notify: bool) -> Self {
        Self {
            parse_mode: config.parse_mode.clone(),
            disable_web_page_preview: config.disable_web_page_preview,
            silent: !notify,
        }
    }
}

#[async_trait]
pub trait ChatSender: Send + Sync {
    async fn send(
        &self,
        recipient: i64,
        text: &str,
        options: &MessageOptions,
    ) -> std::result::Result<(), SendError>;
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    parse_mode: &'a str,
    disable_web_page_preview: bool,
    disable_notification: bool,
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error_code: Option<u16>,
    #[serde(default)]
    description: Option<String>,
}

/// Bot API `sendMessage` client.
pub struct TelegramSender {
    client: Client,
    endpoint: String,
    bot_token: String,
}

impl TelegramSender {
    pub fn new(client: Client, config: &ChatConfig) -> Self {
        Self {
            client,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        }
    }
}

#[async_trait]
impl ChatSender for TelegramSender {
    async fn send(
        &self,
        recipient: i64,
        text: &str,
        options: &MessageOptions,
    ) -> std::result::Result<(), SendError> {
        let url = format!("{}/bot{}/sendMessage", self.endpoint, self.bot_token);
        let request = SendMessageRequest {
            chat_id: recipient,
            text,
            parse_mode: &options.parse_mode,
            disable_web_page_preview: options.disable_web_page_preview,
            disable_notification: options.silent,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| SendError::Transient(e.to_string()))?;

        let status = response.status();
        let body: ApiResponse = response
            .json()
            .await
            .map_err(|e| SendError::Transient(format!("{}: {}", status, e)))?;

        if body.ok {
            return Ok(());
        }
        Err(classify_failure(
            status,
            body.error_code,
            body.description.unwrap_or_else(|| status.to_string()),
        ))
    }
}

/// Blocked means the recipient is gone for good; anything else may be retried.
fn classify_failure(status: StatusCode, error_code: Option<u16>, description: String) -> SendError {
    let lowered = description.to_lowercase();
    let unreachable = status == StatusCode::FORBIDDEN
        || error_code == Some(403)
        || lowered.contains("forbidden")
        || lowered.contains("chat not found")
        || lowered.contains("user is deactivated");

    if unreachable {
        SendError::Blocked(description)
    } else {
        SendError::Transient(description)
    }
}
