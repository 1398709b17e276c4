pub mod http_fetcher;

use std::sync::Arc;

use async_trait::async_trait;

use crate::app::{RelayError, Result};
use crate::domain::ParsedFeed;
use crate::normalizer::Normalizer;

/// One HTTP attempt per call; retries belong to the scheduler.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;

    /// Like [`fetch`](Fetcher::fetch), but fails with `TooLarge` once the
    /// body exceeds `max_bytes`. Implementations should stop reading at
    /// that point; the default only checks after the fact.
    async fn fetch_limited(&self, url: &str, max_bytes: usize) -> Result<Vec<u8>> {
        let body = self.fetch(url).await?;
        if body.len() > max_bytes {
            return Err(RelayError::TooLarge {
                url: url.to_string(),
                limit: max_bytes,
            });
        }
        Ok(body)
    }
}

/// Fetch, sanitize and normalize a feed document.
#[derive(Clone)]
pub struct FeedFetcher {
    fetcher: Arc<dyn Fetcher>,
    normalizer: Normalizer,
}

impl FeedFetcher {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            normalizer: Normalizer::new(),
        }
    }

    pub async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed> {
        let body = self.fetcher.fetch(url).await?;
        let body = sanitize(&body);
        self.normalizer.normalize(&body)
    }
}

/// Drop control characters that strict XML parsers reject. Tab, CR and
/// LF survive. C1 controls are removed when the payload is UTF-8.
pub fn sanitize(body: &[u8]) -> Vec<u8> {
    let keep_byte = |b: u8| !(b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r')) && b != 0x7f;

    match std::str::from_utf8(body) {
        Ok(text) => text
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
            .collect::<String>()
            .into_bytes(),
        Err(_) => body.iter().copied().filter(|b| keep_byte(*b)).collect(),
    }
}
