use feed_rs::model::Entry;
use feed_rs::parser;
use html_escape::decode_html_entities;

use crate::app::{RelayError, Result};
use crate::domain::{Enclosure, FeedItem, ParsedFeed};

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    /// Parse RSS/Atom/JSON Feed. Items come back oldest first; entries
    /// without a date keep their document order ahead of dated ones.
    pub fn normalize(&self, body: &[u8]) -> Result<ParsedFeed> {
        let feed = parser::parse(body).map_err(|e| RelayError::FeedParse(e.to_string()))?;

        let mut items: Vec<FeedItem> = feed.entries.into_iter().map(entry_to_item).collect();
        items.sort_by_key(|item| item.published_at);

        Ok(ParsedFeed {
            title: feed
                .title
                .map(|t| decode_html_entities(&t.content).trim().to_string()),
            description: feed
                .description
                .map(|d| decode_html_entities(&d.content).to_string()),
            items,
        })
    }
}

fn entry_to_item(entry: Entry) -> FeedItem {
    let link = entry
        .links
        .iter()
        .find(|l| l.rel.as_deref().map_or(true, |rel| rel == "alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.clone());

    let id = if entry.id.is_empty() {
        link.clone().unwrap_or_default()
    } else {
        entry.id.clone()
    };

    let mut enclosures: Vec<Enclosure> = entry
        .links
        .iter()
        .filter(|l| l.rel.as_deref() == Some("enclosure"))
        .map(|l| Enclosure {
            url: l.href.clone(),
            mime_type: l.media_type.clone(),
        })
        .collect();
    for media in &entry.media {
        for content in &media.content {
            if let Some(url) = &content.url {
                enclosures.push(Enclosure {
                    url: url.to_string(),
                    mime_type: content.content_type.as_ref().map(|m| m.to_string()),
                });
            }
        }
    }

    let body = entry
        .content
        .and_then(|c| c.body)
        .or(entry.summary.map(|s| s.content));

    FeedItem {
        id,
        link,
        title: entry
            .title
            .map(|t| decode_html_entities(&t.content).to_string()),
        body,
        enclosures,
        published_at: entry.published.or(entry.updated),
    }
}
