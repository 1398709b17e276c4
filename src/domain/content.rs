use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity;

/// One deduplicated feed item. Immutable once stored, except for
/// `article_url` which may be filled in once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub hash_id: String,
    pub source_id: i64,
    pub raw_id: String,
    pub raw_link: String,
    pub torrent_url: Option<String>,
    pub magnet: Option<String>,
    pub title: String,
    /// Item body, kept in memory for rendering only.
    #[serde(skip)]
    pub description: String,
    pub article_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Content {
    /// Identity used to gate deliveries across channels.
    pub fn trigger_id(&self) -> &str {
        identity::trigger_key(
            self.magnet.as_deref(),
            &self.raw_link,
            &self.raw_id,
            &self.hash_id,
        )
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "(Untitled)"
        } else {
            &self.title
        }
    }

    /// Guid reported to torrent channels.
    pub fn torrent_guid(&self) -> &str {
        self.magnet.as_deref().unwrap_or(&self.raw_id)
    }
}
