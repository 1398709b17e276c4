use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: i64,
    pub user_id: i64,
    pub keyword: String,
    pub created_at: DateTime<Utc>,
}

/// Lowercased, trimmed form used for storage and matching.
pub fn normalize_keyword(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Case-insensitive substring match of any keyword against a title.
pub fn matches_any<S: AsRef<str>>(keywords: &[S], title: &str) -> bool {
    let title = title.to_lowercase();
    keywords
        .iter()
        .map(|k| k.as_ref())
        .filter(|k| !k.is_empty())
        .any(|k| title.contains(&k.to_lowercase()))
}
