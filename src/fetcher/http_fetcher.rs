use async_trait::async_trait;
use reqwest::Client;

use crate::app::{RelayError, Result};
use crate::config::HttpConfig;
use crate::fetcher::Fetcher;

/// Shared client for every outbound call; the timeout bounds each request.
pub fn build_client(config: &HttpConfig) -> Client {
    Client::builder()
        .timeout(config.timeout())
        .gzip(true)
        .brotli(true)
        .user_agent(config.user_agent.clone())
        .build()
        .expect("Failed to build HTTP client")
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(build_client(&HttpConfig::default()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Rejects on a declared length over the cap, otherwise reads chunk by
    /// chunk and stops as soon as the cap is passed.
    async fn fetch_limited(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let too_large = || RelayError::TooLarge {
            url: url.to_string(),
            limit: max_bytes,
        };

        let mut response = self.client.get(url).send().await?;
        response.error_for_status_ref()?;
        if response
            .content_length()
            .is_some_and(|len| len > max_bytes as u64)
        {
            return Err(too_large());
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > max_bytes {
                return Err(too_large());
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}
