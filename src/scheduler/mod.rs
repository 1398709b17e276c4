//! Periodic update driver.
//!
//! One tick advances every active subscription's wait counter, fetches
//! each due source once, stores unseen items oldest first and hands them
//! to the distributor. Sources run in parallel under a worker cap, and a
//! source already being fetched is skipped until its fetch finishes.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::distribution::{ArticleDraft, ArticlePublisher, DistributionReport, Distributor};
use crate::domain::{Content, FeedItem, Source};
use crate::fetcher::FeedFetcher;
use crate::identity::{build_content, dedup_key};
use crate::store::Store;
use crate::torrent::MagnetResolver;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub due: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Due sources skipped because a fetch was still running.
    pub in_flight: usize,
    pub new_items: usize,
    pub suspended: usize,
    pub delivery: DistributionReport,
}

#[derive(Debug, Default)]
struct SourceOutcome {
    fetched: bool,
    failed: bool,
    suspended: bool,
    new_items: usize,
    delivery: DistributionReport,
}

/// Removes its source from the in-flight set when dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<i64>>>,
    source_id: i64,
}

impl InFlightGuard {
    fn acquire(set: &Arc<Mutex<HashSet<i64>>>, source_id: i64) -> Option<Self> {
        let mut active = set.lock().ok()?;
        if !active.insert(source_id) {
            return None;
        }
        Some(Self {
            set: set.clone(),
            source_id,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut active) = self.set.lock() {
            active.remove(&self.source_id);
        }
    }
}

#[derive(Clone)]
pub struct UpdateScheduler {
    store: Arc<dyn Store>,
    feeds: FeedFetcher,
    resolver: MagnetResolver,
    distributor: Distributor,
    publisher: Option<Arc<dyn ArticlePublisher>>,
    config: EngineConfig,
    preview_chars: usize,
    semaphore: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
}

impl UpdateScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        feeds: FeedFetcher,
        resolver: MagnetResolver,
        distributor: Distributor,
        config: EngineConfig,
    ) -> Self {
        let workers = config.workers.max(1);
        Self {
            store,
            feeds,
            resolver,
            distributor,
            publisher: None,
            config,
            preview_chars: 0,
            semaphore: Arc::new(Semaphore::new(workers)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Publish long item bodies as articles before delivery.
    pub fn with_publisher(mut self, publisher: Arc<dyn ArticlePublisher>, preview_chars: usize) -> Self {
        self.publisher = Some(publisher);
        self.preview_chars = preview_chars;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn tick(&self) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        let sources = match self.store.active_sources(self.config.error_threshold) {
            Ok(sources) => sources,
            Err(e) => {
                error!("Failed to load active sources: {}", e);
                return report;
            }
        };

        // Dropping the set aborts every source task.
        let mut tasks = JoinSet::new();
        for source in sources {
            match self
                .store
                .advance_wait_times(source.id, self.config.tick_minutes)
            {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!("Failed to advance wait time for source {}: {}", source.id, e);
                    continue;
                }
            }
            report.due += 1;

            let Some(guard) = InFlightGuard::acquire(&self.in_flight, source.id) else {
                debug!("Source {} is still being fetched, skipping", source.id);
                report.in_flight += 1;
                continue;
            };

            let this = self.clone();
            tasks.spawn(async move {
                let _guard = guard;
                let Ok(_permit) = this.semaphore.clone().acquire_owned().await else {
                    return SourceOutcome::default();
                };
                this.update_source(source).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.fetched += usize::from(outcome.fetched);
                    report.failed += usize::from(outcome.failed);
                    report.suspended += usize::from(outcome.suspended);
                    report.new_items += outcome.new_items;
                    report.delivery.merge(outcome.delivery);
                }
                Err(e) => error!("Task join error: {}", e),
            }
        }

        info!(
            "Tick complete: {} due, {} fetched, {} failed, {} new items, {} delivered ({:.1}s)",
            report.due,
            report.fetched,
            report.failed,
            report.new_items,
            report.delivery.delivered(),
            start.elapsed().as_secs_f64()
        );
        report
    }

    async fn update_source(&self, source: Source) -> SourceOutcome {
        let mut outcome = SourceOutcome::default();

        let feed = match self.feeds.fetch_feed(&source.url).await {
            Ok(feed) => feed,
            Err(e) => {
                outcome.failed = true;
                outcome.suspended = self.record_failure(&source, &e.to_string()).await;
                return outcome;
            }
        };
        outcome.fetched = true;

        let new_contents = self.ingest(&source, &feed.items, true).await;

        let title = feed.title.unwrap_or_default();
        if let Err(e) =
            self.store
                .record_fetch_success(source.id, &title, self.config.error_threshold)
        {
            error!("Failed to reset error count for source {}: {}", source.id, e);
        }

        outcome.new_items = new_contents.len();
        if !new_contents.is_empty() {
            info!(
                "{} new items from {}",
                new_contents.len(),
                source.display_title()
            );
            outcome.delivery = self.distributor.distribute(&source, &new_contents).await;
        }
        outcome
    }

    /// Returns true when this failure suspended the source.
    async fn record_failure(&self, source: &Source, reason: &str) -> bool {
        let threshold = self.config.error_threshold;
        let count = match self.store.increment_error_count(source.id, threshold) {
            Ok(Some(count)) => count,
            Ok(None) => {
                debug!(
                    "Fetch failed for source {} after it was suspended: {}",
                    source.id, reason
                );
                return false;
            }
            Err(e) => {
                error!("Failed to record error for source {}: {}", source.id, e);
                return false;
            }
        };
        warn!(
            "Fetch failed for source {} ({}): {} [errors: {}]",
            source.id, source.url, reason, count
        );

        // The increment only applies below the threshold, so reaching it
        // here is the crossing.
        if count >= threshold {
            warn!(
                "Source {} reached {} consecutive errors and is suspended",
                source.id, count
            );
            self.distributor.notify_suspended(source, count).await;
            return true;
        }
        false
    }

    /// Persist `items` without distributing them. Torrent identity is not
    /// resolved for seeded items.
    pub async fn seed(&self, source: &Source, items: &[FeedItem]) -> usize {
        self.ingest(source, items, false).await.len()
    }

    /// Store unseen items and return the ones inserted. A store error skips
    /// only that item; it is retried on the next fetch.
    async fn ingest(&self, source: &Source, items: &[FeedItem], live: bool) -> Vec<Content> {
        let mut created = Vec::new();
        for item in items {
            let hash_id = dedup_key(&source.url, &item.id);
            match self.store.content_exists(&hash_id) {
                Ok(false) => {}
                Ok(true) => continue,
                Err(e) => {
                    error!("Failed to look up item {} of source {}: {}", item.id, source.id, e);
                    continue;
                }
            }

            let torrent = if live {
                self.resolver.resolve(item).await
            } else {
                None
            };
            let mut content = build_content(source, item, torrent);
            match self.store.insert_content(&content) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    error!("Failed to store item {} of source {}: {}", item.id, source.id, e);
                    continue;
                }
            }

            if live {
                self.render_article(source, &mut content).await;
            }
            created.push(content);
        }
        created
    }

    async fn render_article(&self, source: &Source, content: &mut Content) {
        let Some(publisher) = &self.publisher else {
            return;
        };
        if content.article_url.is_some()
            || content.description.chars().count() <= self.preview_chars
        {
            return;
        }

        let draft = ArticleDraft {
            title: content.display_title(),
            subtitle: source.display_title(),
            link: &content.raw_link,
            html: &content.description,
        };
        match publisher.publish(&draft).await {
            Ok(url) => match self.store.set_article_url(&content.hash_id, &url) {
                Ok(true) => content.article_url = Some(url),
                Ok(false) => {}
                Err(e) => error!("Failed to store article url for {}: {}", content.hash_id, e),
            },
            Err(e) => warn!("Article rendering failed for {}: {}", content.raw_link, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::DeliveryConfig;
    use crate::domain::{Subscription, TORRENT_MIME};
    use crate::normalizer::Normalizer;
    use crate::store::{
        ContentRepository, SourceRepository, SqliteStore, SubscriptionRepository, UserRepository,
    };
    use crate::testing::{FakeChat, FakePublisher, FakeTransfer, FakeWebhook, StaticFetcher};
    use crate::torrent::DEFAULT_MAX_TORRENT_BYTES;

    const FEED_URL: &str = "https://example.com/feed.xml";

    struct Harness {
        store: Arc<SqliteStore>,
        fetcher: Arc<StaticFetcher>,
        chat: Arc<FakeChat>,
        transfer: Arc<FakeTransfer>,
        scheduler: UpdateScheduler,
    }

    fn harness(config: EngineConfig) -> Harness {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let fetcher = Arc::new(StaticFetcher::new());
        let chat = Arc::new(FakeChat::default());
        let transfer = Arc::new(FakeTransfer::with_token("tok"));
        let distributor = Distributor::new(
            store.clone(),
            chat.clone(),
            Arc::new(FakeWebhook::default()),
            transfer.clone(),
            DeliveryConfig::default(),
        );
        let scheduler = UpdateScheduler::new(
            store.clone(),
            FeedFetcher::new(fetcher.clone()),
            MagnetResolver::new(fetcher.clone(), DEFAULT_MAX_TORRENT_BYTES),
            distributor,
            config,
        );
        Harness {
            store,
            fetcher,
            chat,
            transfer,
            scheduler,
        }
    }

    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

    /// RSS document with items dated one day apart from 2024-01-01, in the
    /// order given.
    fn rss(items: &[(&str, &str)]) -> String {
        let entries: String = items
            .iter()
            .enumerate()
            .map(|(i, (id, title))| {
                format!(
                    "<item><guid>{id}</guid><title>{title}</title><link>https://example.com/{id}</link>\
                     <pubDate>{}, {:02} Jan 2024 00:00:00 GMT</pubDate></item>",
                    WEEKDAYS[i % 7],
                    i + 1
                )
            })
            .collect();
        format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>Example</title>{}</channel></rss>",
            entries
        )
    }

    fn add_source(h: &Harness, url: &str, users: &[i64]) -> Source {
        let source = h
            .store
            .create_source(&Source::new(url.into(), String::new(), 0))
            .unwrap();
        for user in users {
            h.store.subscribe(&Subscription::new(*user, source.id, 1)).unwrap();
        }
        source
    }

    fn historical() -> Vec<(&'static str, &'static str)> {
        vec![("1", "One"), ("2", "Two"), ("3", "Three"), ("4", "Four"), ("5", "Five")]
    }

    #[tokio::test]
    async fn test_seeded_items_are_not_delivered_and_new_ones_are() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[10, 20]);

        let body = rss(&historical());
        let parsed = Normalizer::new().normalize(body.as_bytes()).unwrap();
        assert_eq!(h.scheduler.seed(&source, &parsed.items).await, 5);
        assert_eq!(h.store.contents_by_source(source.id).unwrap().len(), 5);

        h.fetcher.set(FEED_URL, &body);
        let report = h.scheduler.tick().await;
        assert_eq!(report.new_items, 0);
        assert!(h.chat.sent().is_empty());

        let mut items = historical();
        items.push(("6", "Six"));
        h.fetcher.set(FEED_URL, &rss(&items));
        let report = h.scheduler.tick().await;
        assert_eq!(report.new_items, 1);
        assert_eq!(report.delivery.chat_sent, 2);
        assert_eq!(h.chat.sent_to(10), 1);
        assert_eq!(h.chat.sent_to(20), 1);
    }

    #[tokio::test]
    async fn test_unchanged_feed_is_a_no_op() {
        let h = harness(EngineConfig::default());
        add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A"), ("b", "B")]));

        let first = h.scheduler.tick().await;
        assert_eq!(first.new_items, 2);
        let sent = h.chat.sent().len();

        let second = h.scheduler.tick().await;
        assert_eq!(second.fetched, 1);
        assert_eq!(second.new_items, 0);
        assert_eq!(second.delivery, DistributionReport::default());
        assert_eq!(h.chat.sent().len(), sent);
    }

    #[tokio::test]
    async fn test_items_stored_oldest_first() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        let body = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
            <item><guid>new</guid><pubDate>Wed, 03 Jan 2024 00:00:00 GMT</pubDate></item>\
            <item><guid>old</guid><pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate></item>\
            </channel></rss>";
        h.fetcher.set(FEED_URL, body);

        h.scheduler.tick().await;
        let ids: Vec<String> = h
            .store
            .contents_by_source(source.id)
            .unwrap()
            .into_iter()
            .map(|c| c.raw_id)
            .collect();
        assert_eq!(ids, vec!["old", "new"]);
    }

    #[tokio::test]
    async fn test_interval_gates_fetches() {
        let h = harness(EngineConfig::default());
        let source = h
            .store
            .create_source(&Source::new(FEED_URL.into(), String::new(), 0))
            .unwrap();
        let mut sub = Subscription::new(1, source.id, 3);
        sub.wait_minutes = 0;
        h.store.subscribe(&sub).unwrap();
        h.fetcher.set(FEED_URL, &rss(&[]));

        assert_eq!(h.scheduler.tick().await.due, 0);
        assert_eq!(h.scheduler.tick().await.due, 0);
        assert_eq!(h.scheduler.tick().await.due, 1);
        assert_eq!(h.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_many_subscriptions_one_fetch() {
        let h = harness(EngineConfig::default());
        add_source(&h, FEED_URL, &[1, 2, 3]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A")]));

        let report = h.scheduler.tick().await;
        assert_eq!(report.due, 1);
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(report.delivery.chat_sent, 3);
    }

    #[tokio::test]
    async fn test_failures_back_off_and_suspend_once() {
        let config = EngineConfig {
            error_threshold: 3,
            ..Default::default()
        };
        let h = harness(config);
        let source = add_source(&h, FEED_URL, &[1, 2]);

        for _ in 0..3 {
            assert_eq!(h.scheduler.tick().await.failed, 1);
        }
        assert_eq!(h.store.get_source(source.id).unwrap().unwrap().error_count, 3);
        let notices: Vec<_> = h
            .chat
            .sent()
            .into_iter()
            .filter(|(_, text)| text.contains("consecutive updates"))
            .collect();
        assert_eq!(notices.len(), 2);

        let calls = h.fetcher.calls();
        let report = h.scheduler.tick().await;
        assert_eq!(report.due, 0);
        assert_eq!(h.fetcher.calls(), calls);

        h.store.set_error_count(source.id, 0).unwrap();
        h.fetcher.set(FEED_URL, &rss(&[]));
        assert_eq!(h.scheduler.tick().await.fetched, 1);
    }

    #[tokio::test]
    async fn test_success_resets_error_count() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        h.scheduler.tick().await;
        assert_eq!(h.store.get_source(source.id).unwrap().unwrap().error_count, 1);

        h.fetcher.set(FEED_URL, &rss(&[]));
        h.scheduler.tick().await;
        let source = h.store.get_source(source.id).unwrap().unwrap();
        assert_eq!(source.error_count, 0);
        assert_eq!(source.title, "Example");
    }

    #[tokio::test]
    async fn test_failing_source_does_not_block_others() {
        let h = harness(EngineConfig::default());
        add_source(&h, "https://broken.example/feed", &[1]);
        add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A")]));

        let report = h.scheduler.tick().await;
        assert_eq!(report.failed, 1);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.delivery.chat_sent, 1);
    }

    #[tokio::test]
    async fn test_source_never_fetched_twice_concurrently() {
        let h = harness(EngineConfig::default());
        add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A")]));
        h.fetcher.set_delay(Duration::from_millis(50));

        let (first, second) = tokio::join!(h.scheduler.tick(), h.scheduler.tick());
        assert_eq!(first.in_flight + second.in_flight, 1);
        assert_eq!(h.fetcher.calls(), 1);
        assert_eq!(h.chat.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_pause_during_successful_fetch_is_kept() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A")]));
        h.fetcher.set_delay(Duration::from_millis(100));

        let scheduler = h.scheduler.clone();
        let tick = tokio::spawn(async move { scheduler.tick().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        let sentinel = EngineConfig::default().suspended_sentinel();
        h.store.set_error_count(source.id, sentinel).unwrap();

        let report = tick.await.unwrap();
        assert_eq!(report.fetched, 1);
        assert_eq!(h.store.get_source(source.id).unwrap().unwrap().error_count, sentinel);
    }

    #[tokio::test]
    async fn test_pause_during_failed_fetch_sends_no_notice() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        h.fetcher.set_delay(Duration::from_millis(100));

        let scheduler = h.scheduler.clone();
        let tick = tokio::spawn(async move { scheduler.tick().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        let sentinel = EngineConfig::default().suspended_sentinel();
        h.store.set_error_count(source.id, sentinel).unwrap();

        let report = tick.await.unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.suspended, 0);
        assert!(h.chat.sent().is_empty());
        assert_eq!(h.store.get_source(source.id).unwrap().unwrap().error_count, sentinel);
    }

    #[tokio::test]
    async fn test_store_error_skips_only_that_item() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("1", "One"), ("2", "Two"), ("3", "Three")]));
        h.store
            .execute_batch(
                "CREATE TRIGGER reject_two BEFORE INSERT ON contents
                 WHEN NEW.raw_id = '2'
                 BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
            )
            .unwrap();

        let report = h.scheduler.tick().await;
        assert_eq!(report.new_items, 2);
        assert_eq!(h.chat.sent_to(1), 2);
        assert_eq!(h.store.contents_by_source(source.id).unwrap().len(), 2);

        h.store.execute_batch("DROP TRIGGER reject_two;").unwrap();
        let report = h.scheduler.tick().await;
        assert_eq!(report.new_items, 1);
        assert_eq!(h.chat.sent_to(1), 3);
    }

    #[tokio::test]
    async fn test_aborted_tick_stops_source_work() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A")]));
        h.fetcher.set_delay(Duration::from_millis(100));

        let scheduler = h.scheduler.clone();
        let tick = tokio::spawn(async move { scheduler.tick().await });
        tokio::time::sleep(Duration::from_millis(30)).await;
        tick.abort();
        assert!(tick.await.unwrap_err().is_cancelled());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(h.store.contents_by_source(source.id).unwrap().is_empty());
        assert!(h.chat.sent().is_empty());

        h.fetcher.set_delay(Duration::ZERO);
        let report = h.scheduler.tick().await;
        assert_eq!(report.in_flight, 0);
        assert_eq!(report.new_items, 1);
    }

    #[tokio::test]
    async fn test_same_torrent_from_two_feeds_delivered_once() {
        let h = harness(EngineConfig::default());
        let a = add_source(&h, "https://a.example/feed", &[1]);
        let b = add_source(&h, "https://b.example/feed", &[1]);
        h.store.set_transfer_token(1, Some("tok")).unwrap();
        for source in [&a, &b] {
            let mut sub = h.store.find_subscription(1, source.id).unwrap().unwrap();
            sub.enable_transfer = true;
            h.store.update_subscription(&sub).unwrap();
        }

        let hash = "22c6d340d0cb30922212d15ea410bf28a31f6662";
        let torrent = format!("https://mikanani.me/Download/20240101/{}.torrent", hash);
        for (url, guid) in [("https://a.example/feed", "a-1"), ("https://b.example/feed", "b-9")] {
            let body = format!(
                "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
                 <item><guid>{}</guid><title>Episode 1</title>\
                 <enclosure url=\"{}\" type=\"{}\" length=\"1\"/></item></channel></rss>",
                guid, torrent, TORRENT_MIME
            );
            h.fetcher.set(url, &body);
        }

        let report = h.scheduler.tick().await;
        assert_eq!(report.new_items, 2);
        assert_eq!(h.store.contents_by_source(a.id).unwrap().len(), 1);
        assert_eq!(h.store.contents_by_source(b.id).unwrap().len(), 1);
        assert_eq!(h.chat.sent_to(1), 1);
        assert_eq!(h.transfer.submitted().len(), 1);
        assert_eq!(report.delivery.duplicates, 2);

        let content = &h.store.contents_by_source(a.id).unwrap()[0];
        assert_eq!(
            content.magnet.as_deref(),
            Some(format!("magnet:?xt=urn:btih:{}", hash).as_str())
        );
    }

    #[tokio::test]
    async fn test_long_bodies_publish_articles_once() {
        let h = harness(EngineConfig::default());
        let publisher = Arc::new(FakePublisher::default());
        let scheduler = h.scheduler.clone().with_publisher(publisher.clone(), 5);
        let source = add_source(&h, FEED_URL, &[1]);
        let body = "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
            <item><guid>long</guid><title>Long</title><description>A much longer body</description></item>\
            <item><guid>short</guid><title>Short</title><description>tiny</description></item>\
            </channel></rss>";
        h.fetcher.set(FEED_URL, body);

        scheduler.tick().await;
        assert_eq!(publisher.published(), vec!["Long"]);
        let contents = h.store.contents_by_source(source.id).unwrap();
        let long = contents.iter().find(|c| c.raw_id == "long").unwrap();
        assert_eq!(long.article_url.as_deref(), Some("https://paste.example/p/1"));
        assert!(h.chat.sent()[0].1.contains("https://paste.example/p/1"));

        scheduler.tick().await;
        assert_eq!(publisher.published().len(), 1);
    }

    #[tokio::test]
    async fn test_article_failure_still_delivers() {
        let h = harness(EngineConfig::default());
        let publisher = Arc::new(FakePublisher::default());
        publisher.fail(true);
        let scheduler = h.scheduler.clone().with_publisher(publisher, 0);
        add_source(&h, FEED_URL, &[1]);
        h.fetcher.set(FEED_URL, &rss(&[("a", "A")]));

        let report = scheduler.tick().await;
        assert_eq!(report.delivery.chat_sent, 1);
    }

    #[tokio::test]
    async fn test_unresolvable_torrent_degrades_to_plain_item() {
        let h = harness(EngineConfig::default());
        let source = add_source(&h, FEED_URL, &[1]);
        let body = format!(
            "<?xml version=\"1.0\"?><rss version=\"2.0\"><channel><title>T</title>\
             <item><guid>x</guid><title>X</title>\
             <enclosure url=\"https://tracker.example/x.torrent\" type=\"{}\" length=\"1\"/>\
             </item></channel></rss>",
            TORRENT_MIME
        );
        h.fetcher.set(FEED_URL, &body);

        let report = h.scheduler.tick().await;
        assert_eq!(report.new_items, 1);
        let content = &h.store.contents_by_source(source.id).unwrap()[0];
        assert!(content.magnet.is_none());
        assert!(content.torrent_url.is_none());
    }
}
