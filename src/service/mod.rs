//! User-facing operations on sources, subscriptions and settings.
//!
//! Every operation takes the acting user's id and fails with
//! `SubscriptionNotFound` for subscriptions the user does not own.

use std::sync::Arc;

use tracing::{info, warn};
use url::Url;

use crate::app::{RelayError, Result};
use crate::config::EngineConfig;
use crate::distribution::{AccountSettings, Distributor, TransferClient};
use crate::domain::{Keyword, SettingToggle, Source, Subscription};
use crate::fetcher::FeedFetcher;
use crate::identity::magnet_from;
use crate::scheduler::UpdateScheduler;
use crate::store::{Page, Store};

pub const KEYWORDS_PER_PAGE: usize = 10;

#[derive(Clone)]
pub struct FeedService {
    store: Arc<dyn Store>,
    feeds: FeedFetcher,
    scheduler: UpdateScheduler,
    distributor: Distributor,
    transfer: Arc<dyn TransferClient>,
    config: EngineConfig,
}

impl FeedService {
    pub fn new(
        store: Arc<dyn Store>,
        feeds: FeedFetcher,
        scheduler: UpdateScheduler,
        distributor: Distributor,
        transfer: Arc<dyn TransferClient>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            feeds,
            scheduler,
            distributor,
            transfer,
            config,
        }
    }

    /// Find the source for `url`, creating it on first sight.
    ///
    /// A new source is fetched once to validate it. With initial
    /// suppression on, its current items are stored as already seen while
    /// the source is held above the error threshold, then it is activated.
    pub async fn register_feed(&self, url: &str) -> Result<Source> {
        let url = validate_http_url(url)?;
        if let Some(source) = self.store.find_source_by_url(&url)? {
            return Ok(source);
        }

        let feed = self.feeds.fetch_feed(&url).await?;
        let title = feed.title.clone().unwrap_or_default();

        if !self.config.suppress_initial_items {
            let source = self.store.create_source(&Source::new(url, title, 0))?;
            info!("Registered source {} ({})", source.id, source.url);
            return Ok(source);
        }

        let mut source = self.store.create_source(&Source::new(
            url,
            title,
            self.config.suspended_sentinel(),
        ))?;
        let count = self.scheduler.seed(&source, &feed.items).await;
        info!(
            "Registered source {} ({}) with {} existing items",
            source.id, source.url, count
        );
        self.store.set_error_count(source.id, 0)?;
        source.error_count = 0;
        Ok(source)
    }

    pub async fn subscribe(&self, user_id: i64, url: &str) -> Result<(Source, Subscription)> {
        let source = self.register_feed(url).await?;
        self.store.find_or_create_user(user_id)?;
        if self.store.find_subscription(user_id, source.id)?.is_some() {
            return Err(RelayError::AlreadySubscribed(source.url));
        }

        let subscription = self.store.subscribe(&Subscription::new(
            user_id,
            source.id,
            self.config.default_interval_minutes.max(1),
        ))?;
        info!("User {} subscribed to source {}", user_id, source.id);
        Ok((source, subscription))
    }

    /// Returns true when the source went away with the subscription.
    pub fn unsubscribe(&self, user_id: i64, url: &str) -> Result<bool> {
        let source = self
            .store
            .find_source_by_url(url.trim())?
            .ok_or_else(|| RelayError::SourceNotFound(url.to_string()))?;
        let subscription = self
            .store
            .find_subscription(user_id, source.id)?
            .ok_or(RelayError::SubscriptionNotFound)?;
        self.store.unsubscribe(subscription.id)
    }

    pub fn unsubscribe_by_id(&self, user_id: i64, subscription_id: i64) -> Result<bool> {
        let subscription = self.owned_subscription(user_id, subscription_id)?;
        self.store.unsubscribe(subscription.id)
    }

    /// Returns (removed, failed).
    pub fn unsubscribe_all(&self, user_id: i64) -> Result<(usize, usize)> {
        let mut removed = 0;
        let mut failed = 0;
        for subscription in self.store.subscriptions_by_user(user_id)? {
            match self.store.unsubscribe(subscription.id) {
                Ok(_) => removed += 1,
                Err(e) => {
                    warn!("Failed to remove subscription {}: {}", subscription.id, e);
                    failed += 1;
                }
            }
        }
        Ok((removed, failed))
    }

    pub fn subscriptions(&self, user_id: i64) -> Result<Vec<(Subscription, Source)>> {
        let mut listed = Vec::new();
        for subscription in self.store.subscriptions_by_user(user_id)? {
            if let Some(source) = self.store.get_source(subscription.source_id)? {
                listed.push((subscription, source));
            }
        }
        Ok(listed)
    }

    /// Flip a boolean setting. Turning transfers on needs a stored token.
    pub fn toggle(
        &self,
        user_id: i64,
        subscription_id: i64,
        setting: SettingToggle,
    ) -> Result<Subscription> {
        let mut subscription = self.owned_subscription(user_id, subscription_id)?;
        if setting == SettingToggle::Transfer && !subscription.enable_transfer {
            let has_token = self
                .store
                .get_user(user_id)?
                .is_some_and(|u| u.transfer_token().is_some());
            if !has_token {
                return Err(RelayError::MissingTransferToken);
            }
        }

        subscription.toggle(setting);
        self.store.update_subscription(&subscription)?;
        Ok(subscription)
    }

    pub fn set_tag<S: AsRef<str>>(
        &self,
        user_id: i64,
        subscription_id: i64,
        tags: &[S],
    ) -> Result<Subscription> {
        let mut subscription = self.owned_subscription(user_id, subscription_id)?;
        subscription.set_tags(tags)?;
        self.store.update_subscription(&subscription)?;
        Ok(subscription)
    }

    pub fn set_interval(
        &self,
        user_id: i64,
        subscription_id: i64,
        minutes: u32,
    ) -> Result<Subscription> {
        if minutes < 1 {
            return Err(RelayError::InvalidArgument(
                "interval must be at least 1 minute".into(),
            ));
        }
        let mut subscription = self.owned_subscription(user_id, subscription_id)?;
        subscription.interval_minutes = minutes;
        self.store.update_subscription(&subscription)?;
        Ok(subscription)
    }

    /// Set or clear (`None` or blank) the callback URL.
    pub fn set_webhook(
        &self,
        user_id: i64,
        subscription_id: i64,
        url: Option<&str>,
    ) -> Result<Subscription> {
        let mut subscription = self.owned_subscription(user_id, subscription_id)?;
        subscription.webhook = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => Some(validate_http_url(url)?),
            None => None,
        };
        self.store.update_subscription(&subscription)?;
        Ok(subscription)
    }

    /// Suspend an active source or reactivate a suspended one. Returns
    /// whether the source is now active.
    pub fn toggle_source_update(&self, user_id: i64, source_id: i64) -> Result<bool> {
        self.store
            .find_subscription(user_id, source_id)?
            .ok_or(RelayError::SubscriptionNotFound)?;
        let source = self
            .store
            .get_source(source_id)?
            .ok_or_else(|| RelayError::SourceNotFound(source_id.to_string()))?;

        if source.is_suspended(self.config.error_threshold) {
            self.store.set_error_count(source_id, 0)?;
            Ok(true)
        } else {
            self.store
                .set_error_count(source_id, self.config.suspended_sentinel())?;
            Ok(false)
        }
    }

    pub fn pause_all(&self, user_id: i64) -> Result<usize> {
        self.set_all_error_counts(user_id, self.config.suspended_sentinel())
    }

    pub fn activate_all(&self, user_id: i64) -> Result<usize> {
        self.set_all_error_counts(user_id, 0)
    }

    /// The user's sources that are currently suspended.
    pub fn error_sources(&self, user_id: i64) -> Result<Vec<Source>> {
        Ok(self
            .store
            .sources_for_user(user_id)?
            .into_iter()
            .filter(|s| s.is_suspended(self.config.error_threshold))
            .collect())
    }

    pub fn add_keyword(&self, user_id: i64, keyword: &str) -> Result<Keyword> {
        self.store.find_or_create_user(user_id)?;
        self.store.add_keyword(user_id, keyword)
    }

    pub fn remove_keyword(&self, user_id: i64, keyword_id: i64) -> Result<bool> {
        self.store.remove_keyword(user_id, keyword_id)
    }

    /// `page` is 1-based.
    pub fn keywords(&self, user_id: i64, page: usize) -> Result<Page<Keyword>> {
        self.store.keywords_page(user_id, page, KEYWORDS_PER_PAGE)
    }

    /// Store `token` once the transfer service accepts it.
    pub async fn set_transfer_token(&self, user_id: i64, token: &str) -> Result<AccountSettings> {
        let token = token.trim();
        if token.is_empty() {
            return Err(RelayError::InvalidTransferToken("empty token".into()));
        }

        let settings = self
            .transfer
            .account_settings(token)
            .await
            .map_err(|e| match e {
                RelayError::InvalidTransferToken(_) => e,
                other => RelayError::InvalidTransferToken(other.to_string()),
            })?;
        self.store.set_transfer_token(user_id, Some(token))?;
        info!("Stored transfer token for user {}", user_id);
        Ok(settings)
    }

    /// Forget the token and switch transfers off everywhere.
    pub fn clear_transfer_token(&self, user_id: i64) -> Result<()> {
        self.store.set_transfer_token(user_id, None)?;
        for mut subscription in self.store.subscriptions_by_user(user_id)? {
            if subscription.enable_transfer {
                subscription.enable_transfer = false;
                self.store.update_subscription(&subscription)?;
            }
        }
        Ok(())
    }

    /// Submit links directly for the user. Magnet links are gated by the
    /// ledger; returns how many transfers were added.
    pub async fn manual_transfer<S: AsRef<str>>(&self, user_id: i64, links: &[S]) -> Result<usize> {
        let token = self
            .store
            .get_user(user_id)?
            .and_then(|u| u.transfer_token().map(str::to_string))
            .ok_or(RelayError::MissingTransferToken)?;
        let settings = self.transfer.account_settings(&token).await?;

        let mut added = 0;
        for link in links.iter().map(|l| l.as_ref().trim()).filter(|l| !l.is_empty()) {
            let trigger = magnet_from(link);
            match self
                .distributor
                .submit_transfer(&token, trigger.as_deref(), link, &settings)
                .await
            {
                Ok(true) => added += 1,
                Ok(false) => info!("Skipping already transferred link {}", link),
                Err(e) => warn!("Manual transfer of {} failed: {}", link, e),
            }
        }
        Ok(added)
    }

    /// Delete sources nobody subscribes to. Returns how many went.
    pub fn cleanup_orphan_sources(&self) -> Result<usize> {
        let orphans = self.store.sources_without_subscriptions()?;
        let mut removed = 0;
        for source in orphans {
            // Re-check: a subscription may have arrived since the query.
            if self.store.count_subscriptions(source.id)? > 0 {
                continue;
            }
            self.store.delete_source(source.id)?;
            removed += 1;
        }
        if removed > 0 {
            info!("Removed {} orphan sources", removed);
        }
        Ok(removed)
    }

    fn owned_subscription(&self, user_id: i64, subscription_id: i64) -> Result<Subscription> {
        self.store
            .get_subscription(subscription_id)?
            .filter(|s| s.user_id == user_id)
            .ok_or(RelayError::SubscriptionNotFound)
    }

    fn set_all_error_counts(&self, user_id: i64, count: u32) -> Result<usize> {
        let sources = self.store.sources_for_user(user_id)?;
        for source in &sources {
            self.store.set_error_count(source.id, count)?;
        }
        Ok(sources.len())
    }
}

fn validate_http_url(raw: &str) -> Result<String> {
    let raw = raw.trim();
    let parsed = Url::parse(raw)?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.to_string()),
        other => Err(RelayError::InvalidArgument(format!(
            "unsupported URL scheme: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppContext;
    use crate::config::Config;
    use crate::store::{ContentRepository, SourceRepository, SqliteStore, SubscriptionRepository, UserRepository};
    use crate::testing::{FakeChat, FakeTransfer, FakeWebhook, StaticFetcher};

    const FEED_URL: &str = "https://example.com/feed.xml";

    struct Harness {
        ctx: AppContext,
        fetcher: Arc<StaticFetcher>,
        chat: Arc<FakeChat>,
        transfer: Arc<FakeTransfer>,
        service: FeedService,
    }

    fn harness_with(config: Config) -> Harness {
        let fetcher = Arc::new(StaticFetcher::new());
        let chat = Arc::new(FakeChat::default());
        let transfer = Arc::new(FakeTransfer::with_token("good-token"));
        let ctx = AppContext::with_parts(
            config,
            Arc::new(SqliteStore::in_memory().unwrap()),
            fetcher.clone(),
            chat.clone(),
            Arc::new(FakeWebhook::default()),
            transfer.clone(),
            None,
        );
        let service = ctx.service();
        Harness {
            ctx,
            fetcher,
            chat,
            transfer,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with(Config::default())
    }

    fn rss(count: usize) -> String {
        let items: String = (1..=count)
            .map(|i| {
                format!(
                    "<item><guid>item-{i}</guid><title>Item {i}</title>\
                     <link>https://example.com/{i}</link></item>"
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Example</title>{}</channel></rss>",
            items
        )
    }

    #[tokio::test]
    async fn test_first_fetch_is_suppressed_then_new_items_delivered() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(5));

        let (source, _) = h.service.subscribe(1, FEED_URL).await.unwrap();
        h.service.subscribe(2, FEED_URL).await.unwrap();
        assert_eq!(source.error_count, 0);
        assert_eq!(h.ctx.store.contents_by_source(source.id).unwrap().len(), 5);
        assert_eq!(h.fetcher.calls(), 1);

        let scheduler = h.ctx.scheduler();
        scheduler.tick().await;
        assert!(h.chat.sent().is_empty());

        h.fetcher.set(FEED_URL, &rss(6));
        let report = scheduler.tick().await;
        assert_eq!(report.new_items, 1);
        assert_eq!(h.chat.sent_to(1), 1);
        assert_eq!(h.chat.sent_to(2), 1);
    }

    #[tokio::test]
    async fn test_without_suppression_backlog_is_delivered() {
        let mut config = Config::default();
        config.engine.suppress_initial_items = false;
        let h = harness_with(config);
        h.fetcher.set(FEED_URL, &rss(3));

        let (source, _) = h.service.subscribe(1, FEED_URL).await.unwrap();
        assert!(h.ctx.store.contents_by_source(source.id).unwrap().is_empty());

        h.ctx.scheduler().tick().await;
        assert_eq!(h.chat.sent_to(1), 3);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_feeds() {
        let h = harness();
        assert!(h.service.register_feed("ftp://example.com/feed").await.is_err());
        assert!(h.service.register_feed("not a url").await.is_err());

        h.fetcher.set(FEED_URL, "<html>not a feed</html>");
        assert!(matches!(
            h.service.register_feed(FEED_URL).await,
            Err(RelayError::FeedParse(_))
        ));
        assert!(h.ctx.store.find_source_by_url(FEED_URL).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(1));
        h.service.subscribe(1, FEED_URL).await.unwrap();
        assert!(matches!(
            h.service.subscribe(1, FEED_URL).await,
            Err(RelayError::AlreadySubscribed(_))
        ));
    }

    #[tokio::test]
    async fn test_unsubscribe_last_removes_source() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(2));
        let (source, _) = h.service.subscribe(1, FEED_URL).await.unwrap();
        let (_, second) = h.service.subscribe(2, FEED_URL).await.unwrap();

        assert!(!h.service.unsubscribe(1, FEED_URL).unwrap());
        assert!(matches!(
            h.service.unsubscribe_by_id(1, second.id),
            Err(RelayError::SubscriptionNotFound)
        ));
        assert!(h.service.unsubscribe_by_id(2, second.id).unwrap());
        assert!(h.ctx.store.get_source(source.id).unwrap().is_none());
        assert!(h.ctx.store.contents_by_source(source.id).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_all() {
        let h = harness();
        for i in 0..3 {
            let url = format!("https://example.com/{}.xml", i);
            h.fetcher.set(&url, &rss(1));
            h.service.subscribe(1, &url).await.unwrap();
        }
        assert_eq!(h.service.unsubscribe_all(1).unwrap(), (3, 0));
        assert!(h.service.subscriptions(1).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_enabling_transfer_requires_token() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(1));
        let (_, sub) = h.service.subscribe(1, FEED_URL).await.unwrap();

        assert!(matches!(
            h.service.toggle(1, sub.id, SettingToggle::Transfer),
            Err(RelayError::MissingTransferToken)
        ));

        h.service.set_transfer_token(1, "good-token").await.unwrap();
        let sub = h.service.toggle(1, sub.id, SettingToggle::Transfer).unwrap();
        assert!(sub.enable_transfer);

        h.service.clear_transfer_token(1).unwrap();
        let reloaded = h.ctx.store.get_subscription(sub.id).unwrap().unwrap();
        assert!(!reloaded.enable_transfer);
    }

    #[tokio::test]
    async fn test_invalid_transfer_token_not_stored() {
        let h = harness();
        assert!(matches!(
            h.service.set_transfer_token(1, "bad-token").await,
            Err(RelayError::InvalidTransferToken(_))
        ));
        assert!(h
            .ctx
            .store
            .get_user(1)
            .unwrap()
            .and_then(|u| u.transfer_token)
            .is_none());
    }

    #[tokio::test]
    async fn test_settings_updates() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(1));
        let (_, sub) = h.service.subscribe(1, FEED_URL).await.unwrap();

        let sub = h.service.set_tag(1, sub.id, &["anime", "#1080p"]).unwrap();
        assert_eq!(sub.tag, "#anime #1080p");
        assert!(h.service.set_tag(1, sub.id, &["a", "b", "c", "d"]).is_err());

        assert!(h.service.set_interval(1, sub.id, 0).is_err());
        assert_eq!(h.service.set_interval(1, sub.id, 30).unwrap().interval_minutes, 30);

        assert!(h.service.set_webhook(1, sub.id, Some("javascript:alert(1)")).is_err());
        let sub = h
            .service
            .set_webhook(1, sub.id, Some(" https://hooks.example/in "))
            .unwrap();
        assert_eq!(sub.webhook.as_deref(), Some("https://hooks.example/in"));
        let sub = h.service.set_webhook(1, sub.id, None).unwrap();
        assert!(sub.webhook.is_none());

        let sub = h.service.toggle(1, sub.id, SettingToggle::Notification).unwrap();
        assert!(!sub.enable_notification);
        assert!(matches!(
            h.service.toggle(2, sub.id, SettingToggle::Filter),
            Err(RelayError::SubscriptionNotFound)
        ));
    }

    #[tokio::test]
    async fn test_source_pause_and_activate() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(1));
        let (source, _) = h.service.subscribe(1, FEED_URL).await.unwrap();

        assert!(!h.service.toggle_source_update(1, source.id).unwrap());
        assert_eq!(h.service.error_sources(1).unwrap().len(), 1);
        assert!(h.service.toggle_source_update(1, source.id).unwrap());
        assert!(h.service.error_sources(1).unwrap().is_empty());
        assert!(h.service.toggle_source_update(2, source.id).is_err());

        assert_eq!(h.service.pause_all(1).unwrap(), 1);
        assert_eq!(h.ctx.scheduler().tick().await.due, 0);
        assert_eq!(h.service.activate_all(1).unwrap(), 1);
        assert_eq!(h.ctx.scheduler().tick().await.due, 1);
    }

    #[tokio::test]
    async fn test_keyword_pages() {
        let h = harness();
        for i in 0..12 {
            h.service.add_keyword(1, &format!("kw{:02}", i)).unwrap();
        }
        let first = h.service.keywords(1, 1).unwrap();
        assert_eq!(first.items.len(), KEYWORDS_PER_PAGE);
        assert!(first.has_next());
        let second = h.service.keywords(1, 2).unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(second.has_prev());
        assert!(h.service.remove_keyword(1, second.items[0].id).unwrap());
    }

    #[tokio::test]
    async fn test_manual_transfer() {
        let h = harness();
        let links = [
            "magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567&dn=x",
            "https://tracker.example/a.torrent",
            " ",
        ];
        assert!(matches!(
            h.service.manual_transfer(1, &links).await,
            Err(RelayError::MissingTransferToken)
        ));

        h.service.set_transfer_token(1, "good-token").await.unwrap();
        assert_eq!(h.service.manual_transfer(1, &links).await.unwrap(), 2);
        assert_eq!(h.service.manual_transfer(1, &links).await.unwrap(), 1);
        assert_eq!(h.transfer.submitted().len(), 3);
    }

    #[tokio::test]
    async fn test_cleanup_orphan_sources() {
        let h = harness();
        h.fetcher.set(FEED_URL, &rss(2));
        let orphan = h.service.register_feed(FEED_URL).await.unwrap();
        let other = "https://example.com/other.xml";
        h.fetcher.set(other, &rss(1));
        h.service.subscribe(1, other).await.unwrap();

        assert_eq!(h.service.cleanup_orphan_sources().unwrap(), 1);
        assert!(h.ctx.store.get_source(orphan.id).unwrap().is_none());
        assert!(h.ctx.store.find_source_by_url(other).unwrap().is_some());
    }
}
