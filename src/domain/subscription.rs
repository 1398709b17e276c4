use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{RelayError, Result};

pub const MAX_TAGS: usize = 3;

/// A user's binding to a source together with personal delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: i64,
    pub user_id: i64,
    pub source_id: i64,
    /// Controls sound/priority only, not whether a message is sent.
    pub enable_notification: bool,
    pub enable_article: bool,
    pub enable_transfer: bool,
    pub enable_filter: bool,
    /// Stored as `#a #b`, empty when unset.
    pub tag: String,
    pub webhook: Option<String>,
    pub interval_minutes: u32,
    pub wait_minutes: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Boolean settings a user can flip on a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingToggle {
    Notification,
    Article,
    Transfer,
    Filter,
}

impl Subscription {
    pub fn new(user_id: i64, source_id: i64, interval_minutes: u32) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            user_id,
            source_id,
            enable_notification: true,
            enable_article: true,
            enable_transfer: false,
            enable_filter: false,
            tag: String::new(),
            webhook: None,
            interval_minutes,
            // Start saturated so the first tick after subscribing polls.
            wait_minutes: interval_minutes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn toggle(&mut self, setting: SettingToggle) -> bool {
        let flag = match setting {
            SettingToggle::Notification => &mut self.enable_notification,
            SettingToggle::Article => &mut self.enable_article,
            SettingToggle::Transfer => &mut self.enable_transfer,
            SettingToggle::Filter => &mut self.enable_filter,
        };
        *flag = !*flag;
        *flag
    }

    /// Tag tokens without the leading `#`.
    pub fn tags(&self) -> Vec<String> {
        self.tag
            .split_whitespace()
            .map(|t| t.trim_start_matches('#').to_string())
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn set_tags<S: AsRef<str>>(&mut self, tags: &[S]) -> Result<()> {
        self.tag = format_tags(tags)?;
        Ok(())
    }

    /// Advance the wait counter by one tick. Returns true when the
    /// subscription wants a poll, resetting the counter.
    pub fn advance(&mut self, tick_minutes: u32) -> bool {
        self.wait_minutes = self.wait_minutes.saturating_add(tick_minutes);
        if self.wait_minutes >= self.interval_minutes {
            self.wait_minutes = 0;
            true
        } else {
            false
        }
    }
}

pub fn format_tags<S: AsRef<str>>(tags: &[S]) -> Result<String> {
    let tokens: Vec<&str> = tags
        .iter()
        .map(|t| t.as_ref().trim().trim_start_matches('#'))
        .filter(|t| !t.is_empty())
        .collect();

    if tokens.len() > MAX_TAGS {
        return Err(RelayError::InvalidArgument(format!(
            "at most {} tags are allowed",
            MAX_TAGS
        )));
    }
    if let Some(bad) = tokens.iter().find(|t| t.contains(char::is_whitespace)) {
        return Err(RelayError::InvalidArgument(format!("invalid tag: {}", bad)));
    }

    Ok(tokens
        .iter()
        .map(|t| format!("#{}", t))
        .collect::<Vec<_>>()
        .join(" "))
}
