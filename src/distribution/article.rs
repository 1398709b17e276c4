use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::app::{RelayError, Result};
use crate::config::ArticleConfig;

#[derive(Debug, Clone, Serialize)]
pub struct ArticleDraft<'a> {
    pub title: &'a str,
    pub subtitle: &'a str,
    pub link: &'a str,
    pub html: &'a str,
}

/// Publishes an item body as a standalone page and returns its URL.
#[async_trait]
pub trait ArticlePublisher: Send + Sync {
    async fn publish(&self, draft: &ArticleDraft<'_>) -> Result<String>;
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    author_name: &'a str,
    #[serde(flatten)]
    draft: &'a ArticleDraft<'a>,
}

#[derive(Deserialize)]
struct PublishResponse {
    url: String,
}

pub struct HttpArticlePublisher {
    client: Client,
    endpoint: String,
    access_token: String,
    author_name: String,
}

impl HttpArticlePublisher {
    /// `None` when publishing is disabled or no endpoint is set.
    pub fn from_config(client: Client, config: &ArticleConfig) -> Option<Self> {
        if !config.enabled || config.endpoint.is_empty() {
            return None;
        }
        Some(Self {
            client,
            endpoint: config.endpoint.clone(),
            access_token: config.access_token.clone(),
            author_name: config.author_name.clone(),
        })
    }
}

#[async_trait]
impl ArticlePublisher for HttpArticlePublisher {
    async fn publish(&self, draft: &ArticleDraft<'_>) -> Result<String> {
        let request = PublishRequest {
            author_name: &self.author_name,
            draft,
        };
        let response: PublishResponse = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.url.is_empty() {
            return Err(RelayError::Other("article service returned no url".into()));
        }
        Ok(response.url)
    }
}
