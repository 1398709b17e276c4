//! Fan-out of new content to every subscriber channel.
//!
//! Each (channel, trigger key, target) triple is delivered at most once:
//! the ledger is consulted before sending and written only after the
//! channel reports success. A crash between the two can repeat a send.

pub mod article;
pub mod chat;
pub mod preview;
pub mod template;
pub mod transfer;
pub mod webhook;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{error, info, warn};

use crate::app::Result;
use crate::config::DeliveryConfig;
use crate::domain::keyword::matches_any;
use crate::domain::{Content, DeliveryKey, Source, Subscription};
use crate::store::Store;

pub use article::{ArticleDraft, ArticlePublisher, HttpArticlePublisher};
pub use chat::{ChatSender, MessageOptions, TelegramSender};
pub use transfer::{AccountSettings, PutioClient, TransferClient};
pub use webhook::{HttpWebhookSender, WebhookPayload, WebhookSender};

use template::{render_message, render_suspension_notice, MessageContext};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DistributionReport {
    pub chat_sent: usize,
    pub webhook_sent: usize,
    pub transfer_sent: usize,
    /// Skipped because the ledger already held the key.
    pub duplicates: usize,
    pub failed: usize,
    /// Subscriptions removed because the recipient blocked the bot.
    pub deactivated: usize,
}

impl DistributionReport {
    pub fn delivered(&self) -> usize {
        self.chat_sent + self.webhook_sent + self.transfer_sent
    }

    pub fn merge(&mut self, other: DistributionReport) {
        self.chat_sent += other.chat_sent;
        self.webhook_sent += other.webhook_sent;
        self.transfer_sent += other.transfer_sent;
        self.duplicates += other.duplicates;
        self.failed += other.failed;
        self.deactivated += other.deactivated;
    }
}

/// Per-batch lookups shared across a source's new items.
#[derive(Default)]
struct BatchCache {
    keywords: HashMap<i64, Vec<String>>,
    tokens: HashMap<i64, Option<String>>,
    settings: HashMap<String, Option<AccountSettings>>,
    removed: HashSet<i64>,
}

#[derive(Clone)]
pub struct Distributor {
    store: Arc<dyn Store>,
    chat: Arc<dyn ChatSender>,
    webhook: Arc<dyn WebhookSender>,
    transfer: Arc<dyn TransferClient>,
    config: DeliveryConfig,
}

impl Distributor {
    pub fn new(
        store: Arc<dyn Store>,
        chat: Arc<dyn ChatSender>,
        webhook: Arc<dyn WebhookSender>,
        transfer: Arc<dyn TransferClient>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            store,
            chat,
            webhook,
            transfer,
            config,
        }
    }

    /// Deliver `contents` (oldest first) to every subscription of `source`.
    pub async fn distribute(&self, source: &Source, contents: &[Content]) -> DistributionReport {
        let mut report = DistributionReport::default();
        if contents.is_empty() {
            return report;
        }

        let subscriptions = match self.store.subscriptions_by_source(source.id) {
            Ok(subs) => subs,
            Err(e) => {
                error!("Failed to load subscriptions for source {}: {}", source.id, e);
                return report;
            }
        };

        let mut cache = BatchCache::default();
        for content in contents {
            for subscription in &subscriptions {
                if cache.removed.contains(&subscription.id) {
                    continue;
                }
                let result = self
                    .deliver_one(source, content, subscription, &mut cache)
                    .await;
                report.merge(result);
            }
        }

        report
    }

    async fn deliver_one(
        &self,
        source: &Source,
        content: &Content,
        subscription: &Subscription,
        cache: &mut BatchCache,
    ) -> DistributionReport {
        let mut report = DistributionReport::default();
        let trigger = content.trigger_id();

        let chat_key = DeliveryKey::chat(trigger, subscription.user_id);
        if self.already_delivered(&chat_key) {
            report.duplicates += 1;
        } else {
            let text = render_message(
                &self.config.message_template,
                &MessageContext {
                    source,
                    content,
                    subscription,
                    preview_chars: self.config.preview_chars,
                },
            );
            let options = MessageOptions::from_config(&self.config, subscription.enable_notification);
            match self.chat.send(subscription.user_id, &text, &options).await {
                Ok(()) => {
                    report.chat_sent += 1;
                    self.record(&chat_key);
                }
                Err(e) if e.is_blocked() => {
                    warn!(
                        "User {} is unreachable ({}), removing subscription {}",
                        subscription.user_id, e, subscription.id
                    );
                    self.deactivate(subscription);
                    cache.removed.insert(subscription.id);
                    report.deactivated += 1;
                    return report;
                }
                Err(e) => {
                    warn!(
                        "Chat delivery failed: kind={} trigger={} target={}: {}",
                        chat_key.kind.label(),
                        trigger,
                        subscription.user_id,
                        e
                    );
                    report.failed += 1;
                }
            }
        }

        if content.torrent_url.is_none() {
            return report;
        }

        if let Some(url) = subscription.webhook.as_deref().filter(|u| !u.is_empty()) {
            report.merge(self.deliver_webhook(content, subscription, url).await);
        }

        if subscription.enable_transfer {
            report.merge(self.deliver_transfer(content, subscription, cache).await);
        }

        report
    }

    async fn deliver_webhook(
        &self,
        content: &Content,
        subscription: &Subscription,
        url: &str,
    ) -> DistributionReport {
        let mut report = DistributionReport::default();
        let Some(payload) = WebhookPayload::for_content(content, subscription) else {
            return report;
        };

        let key = DeliveryKey::webhook(content.trigger_id(), url);
        if self.already_delivered(&key) {
            report.duplicates += 1;
            return report;
        }

        match self.webhook.post(url, &payload).await {
            Ok(()) => {
                report.webhook_sent += 1;
                self.record(&key);
            }
            Err(e) => {
                warn!(
                    "Webhook delivery failed: kind={} trigger={} target={}: {}",
                    key.kind.label(),
                    key.trigger_id,
                    url,
                    e
                );
                report.failed += 1;
            }
        }
        report
    }

    async fn deliver_transfer(
        &self,
        content: &Content,
        subscription: &Subscription,
        cache: &mut BatchCache,
    ) -> DistributionReport {
        let mut report = DistributionReport::default();
        let Some(torrent_url) = content.torrent_url.as_deref() else {
            return report;
        };
        let Some(token) = self.user_token(subscription.user_id, cache) else {
            return report;
        };

        if subscription.enable_filter {
            let keywords = self.user_keywords(subscription.user_id, cache);
            if !matches_any(keywords, &content.title) {
                return report;
            }
        }

        let key = DeliveryKey::transfer(content.trigger_id(), &token);
        if self.already_delivered(&key) {
            report.duplicates += 1;
            return report;
        }

        let Some(settings) = self.account_settings(&token, cache).await else {
            report.failed += 1;
            return report;
        };

        match self.transfer.submit(&token, torrent_url, &settings).await {
            Ok(()) => {
                report.transfer_sent += 1;
                self.record(&key);
            }
            Err(e) => {
                warn!(
                    "Transfer failed: kind={} trigger={} target=user:{}: {}",
                    key.kind.label(),
                    key.trigger_id,
                    subscription.user_id,
                    e
                );
                report.failed += 1;
            }
        }
        report
    }

    /// Submit one link for `token`, gated by `trigger` when known.
    /// Returns false when the ledger already held the key.
    pub async fn submit_transfer(
        &self,
        token: &str,
        trigger: Option<&str>,
        url: &str,
        settings: &AccountSettings,
    ) -> Result<bool> {
        let key = trigger.map(|t| DeliveryKey::transfer(t, token));
        if let Some(key) = &key {
            if self.store.is_delivered(key)? {
                return Ok(false);
            }
        }

        self.transfer.submit(token, url, settings).await?;
        if let Some(key) = &key {
            self.record(key);
        }
        Ok(true)
    }

    /// Tell every subscriber the source stopped being polled.
    pub async fn notify_suspended(&self, source: &Source, error_count: u32) -> usize {
        let subscriptions = match self.store.subscriptions_by_source(source.id) {
            Ok(subs) => subs,
            Err(e) => {
                error!("Failed to load subscribers of source {}: {}", source.id, e);
                return 0;
            }
        };

        let text = render_suspension_notice(source, error_count);
        let options = MessageOptions::from_config(&self.config, true);
        let mut sent = 0;
        for subscription in &subscriptions {
            match self.chat.send(subscription.user_id, &text, &options).await {
                Ok(()) => sent += 1,
                Err(e) => warn!(
                    "Suspension notice for source {} to user {} failed: {}",
                    source.id, subscription.user_id, e
                ),
            }
        }
        info!(
            "Source {} suspended after {} errors, notified {} of {} subscribers",
            source.id,
            error_count,
            sent,
            subscriptions.len()
        );
        sent
    }

    /// A ledger read failure counts as delivered so retries never double-send.
    fn already_delivered(&self, key: &DeliveryKey) -> bool {
        match self.store.is_delivered(key) {
            Ok(delivered) => delivered,
            Err(e) => {
                error!(
                    "Ledger lookup failed for kind={} trigger={} target={}: {}",
                    key.kind.label(),
                    key.trigger_id,
                    key.target_id,
                    e
                );
                true
            }
        }
    }

    fn record(&self, key: &DeliveryKey) {
        if let Err(e) = self.store.record_delivery(key) {
            error!(
                "Delivered but failed to record kind={} trigger={} target={}: {}",
                key.kind.label(),
                key.trigger_id,
                key.target_id,
                e
            );
        }
    }

    fn deactivate(&self, subscription: &Subscription) {
        match self.store.unsubscribe(subscription.id) {
            Ok(true) => info!(
                "Source {} removed with its last subscription",
                subscription.source_id
            ),
            Ok(false) => {}
            Err(e) => error!("Failed to remove subscription {}: {}", subscription.id, e),
        }
    }

    fn user_token(&self, user_id: i64, cache: &mut BatchCache) -> Option<String> {
        cache
            .tokens
            .entry(user_id)
            .or_insert_with(|| match self.store.get_user(user_id) {
                Ok(user) => user.and_then(|u| u.transfer_token().map(str::to_string)),
                Err(e) => {
                    error!("Failed to load user {}: {}", user_id, e);
                    None
                }
            })
            .clone()
    }

    fn user_keywords<'c>(&self, user_id: i64, cache: &'c mut BatchCache) -> &'c [String] {
        cache.keywords.entry(user_id).or_insert_with(|| {
            match self.store.keywords(user_id) {
                Ok(keywords) => keywords.into_iter().map(|k| k.keyword).collect(),
                Err(e) => {
                    error!("Failed to load keywords for user {}: {}", user_id, e);
                    Vec::new()
                }
            }
        })
    }

    async fn account_settings(&self, token: &str, cache: &mut BatchCache) -> Option<AccountSettings> {
        if let Some(cached) = cache.settings.get(token) {
            return cached.clone();
        }
        let settings = match self.transfer.account_settings(token).await {
            Ok(settings) => Some(settings),
            Err(e) => {
                warn!("Failed to read transfer account settings: {}", e);
                None
            }
        };
        cache.settings.insert(token.to_string(), settings.clone());
        settings
    }
}
