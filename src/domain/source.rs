use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub error_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Source {
    pub fn new(url: String, title: String, error_count: u32) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            url,
            title,
            error_count,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            &self.url
        } else {
            &self.title
        }
    }

    /// A suspended source is skipped by the scheduler until reset.
    pub fn is_suspended(&self, threshold: u32) -> bool {
        self.error_count >= threshold
    }
}
