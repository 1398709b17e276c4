use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::app::{RelayError, Result};
use crate::domain::{Content, Subscription};

/// JSON body posted to subscriber callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub title: String,
    pub guid: String,
    pub link: String,
    pub tags: Vec<String>,
}

impl WebhookPayload {
    /// `None` unless the content carries a torrent link.
    pub fn for_content(content: &Content, subscription: &Subscription) -> Option<Self> {
        let link = content.torrent_url.clone()?;
        Some(Self {
            title: content.title.clone(),
            guid: content.torrent_guid().to_string(),
            link,
            tags: subscription.tags(),
        })
    }
}

#[async_trait]
pub trait WebhookSender: Send + Sync {
    /// Ok only for a 2xx response.
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<()>;
}

pub struct HttpWebhookSender {
    client: Client,
}

impl HttpWebhookSender {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookSender for HttpWebhookSender {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::Other(format!("webhook {} returned {}", url, status)));
        }
        Ok(())
    }
}
