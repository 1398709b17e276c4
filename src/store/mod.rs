pub mod sqlite;

use crate::app::Result;
use crate::domain::{Content, DeliveryKey, Keyword, Source, Subscription, User};

pub use sqlite::SqliteStore;

pub trait SourceRepository {
    fn find_source_by_url(&self, url: &str) -> Result<Option<Source>>;
    fn get_source(&self, id: i64) -> Result<Option<Source>>;
    /// Insert a new source, returning it with its assigned id.
    fn create_source(&self, source: &Source) -> Result<Source>;
    /// Sources below `threshold` that have at least one subscription.
    fn active_sources(&self, threshold: u32) -> Result<Vec<Source>>;
    fn sources_without_subscriptions(&self) -> Result<Vec<Source>>;
    /// Sources a user is subscribed to, ordered by title.
    fn sources_for_user(&self, user_id: i64) -> Result<Vec<Source>>;
    /// Delete a source and its content. Callers own the decision that no
    /// subscriptions remain.
    fn delete_source(&self, id: i64) -> Result<()>;
    /// Update the title and clear the error count, unless the source was
    /// suspended (count at or above `threshold`) meanwhile.
    fn record_fetch_success(&self, id: i64, title: &str, threshold: u32) -> Result<()>;
    /// Count one more failure for a source below `threshold`. Returns the
    /// new count, or `None` when the source is already suspended.
    fn increment_error_count(&self, id: i64, threshold: u32) -> Result<Option<u32>>;
    fn set_error_count(&self, id: i64, count: u32) -> Result<()>;
}

pub trait SubscriptionRepository {
    /// Fails with `AlreadySubscribed` when the pair exists.
    fn subscribe(&self, subscription: &Subscription) -> Result<Subscription>;
    fn get_subscription(&self, id: i64) -> Result<Option<Subscription>>;
    fn find_subscription(&self, user_id: i64, source_id: i64) -> Result<Option<Subscription>>;
    fn subscriptions_by_user(&self, user_id: i64) -> Result<Vec<Subscription>>;
    fn subscriptions_by_source(&self, source_id: i64) -> Result<Vec<Subscription>>;
    fn count_subscriptions(&self, source_id: i64) -> Result<usize>;
    fn update_subscription(&self, subscription: &Subscription) -> Result<()>;
    /// Advance every subscription of a source by one tick and persist the
    /// counters. Returns true when any of them is due.
    fn advance_wait_times(&self, source_id: i64, tick_minutes: u32) -> Result<bool>;
    /// Delete a subscription; when it was the last one, the source and its
    /// content go too. Returns whether the source was removed.
    fn unsubscribe(&self, subscription_id: i64) -> Result<bool>;
}

pub trait ContentRepository {
    fn content_exists(&self, hash_id: &str) -> Result<bool>;
    fn get_content(&self, hash_id: &str) -> Result<Option<Content>>;
    /// Returns false when the hash was already stored.
    fn insert_content(&self, content: &Content) -> Result<bool>;
    /// Sets the article URL only if none is stored yet.
    fn set_article_url(&self, hash_id: &str, url: &str) -> Result<bool>;
    /// In creation order.
    fn contents_by_source(&self, source_id: i64) -> Result<Vec<Content>>;
}

pub trait DeliveryLedger {
    fn is_delivered(&self, key: &DeliveryKey) -> Result<bool>;
    fn record_delivery(&self, key: &DeliveryKey) -> Result<()>;
}

pub trait KeywordRepository {
    /// Stores the normalized keyword; adding an existing one returns it.
    fn add_keyword(&self, user_id: i64, keyword: &str) -> Result<Keyword>;
    fn remove_keyword(&self, user_id: i64, keyword_id: i64) -> Result<bool>;
    /// Alphabetical.
    fn keywords(&self, user_id: i64) -> Result<Vec<Keyword>>;
    /// `page` is 1-based.
    fn keywords_page(&self, user_id: i64, page: usize, per_page: usize) -> Result<Page<Keyword>>;
}

pub trait UserRepository {
    fn find_or_create_user(&self, id: i64) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn set_transfer_token(&self, id: i64, token: Option<&str>) -> Result<()>;
}

/// Everything the engine needs from persistence.
pub trait Store:
    SourceRepository
    + SubscriptionRepository
    + ContentRepository
    + DeliveryLedger
    + KeywordRepository
    + UserRepository
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: SourceRepository
        + SubscriptionRepository
        + ContentRepository
        + DeliveryLedger
        + KeywordRepository
        + UserRepository
        + Send
        + Sync
{
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_mul(self.per_page) < self.total
    }
}
