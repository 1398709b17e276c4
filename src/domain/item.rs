use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TORRENT_MIME: &str = "application/x-bittorrent";

/// A parsed feed document.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Oldest first.
    pub items: Vec<FeedItem>,
}

/// One entry as the provider published it, before identity is assigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedItem {
    pub id: String,
    pub link: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub enclosures: Vec<Enclosure>,
    pub published_at: Option<DateTime<Utc>>,
}

/// A torrent enclosure whose info-hash could be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentIdentity {
    pub torrent_url: String,
    pub magnet: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: Option<String>,
}

impl Enclosure {
    pub fn is_torrent(&self) -> bool {
        self.mime_type
            .as_deref()
            .is_some_and(|m| m.starts_with(TORRENT_MIME))
    }
}

impl FeedItem {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Torrent enclosure URL, or the link itself when it points at a
    /// `.torrent` file.
    pub fn torrent_url(&self) -> Option<&str> {
        self.enclosures
            .iter()
            .find(|e| e.is_torrent())
            .map(|e| e.url.as_str())
            .or_else(|| self.link.as_deref().filter(|l| l.ends_with(".torrent")))
    }
}
