use std::sync::Arc;

use crate::app::error::{RelayError, Result};
use crate::config::Config;
use crate::distribution::{
    ArticlePublisher, ChatSender, Distributor, HttpArticlePublisher, HttpWebhookSender, PutioClient,
    TelegramSender, TransferClient, WebhookSender,
};
use crate::fetcher::http_fetcher::{build_client, HttpFetcher};
use crate::fetcher::{FeedFetcher, Fetcher};
use crate::service::FeedService;
use crate::scheduler::UpdateScheduler;
use crate::store::sqlite::SqliteStore;
use crate::torrent::MagnetResolver;

pub struct AppContext {
    pub config: Config,
    pub store: Arc<SqliteStore>,
    pub fetcher: Arc<dyn Fetcher>,
    pub resolver: MagnetResolver,
    pub chat: Arc<dyn ChatSender>,
    pub webhook: Arc<dyn WebhookSender>,
    pub transfer: Arc<dyn TransferClient>,
    pub publisher: Option<Arc<dyn ArticlePublisher>>,
}

impl AppContext {
    /// File-backed store and HTTP collaborators sharing one client.
    pub fn new(config: Config) -> Result<Self> {
        let db_path = config
            .database_path()
            .map_err(|e| RelayError::Config(e.to_string()))?;
        let store = Arc::new(SqliteStore::new(&db_path)?);

        let client = build_client(&config.http);
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new(client.clone()));
        let chat: Arc<dyn ChatSender> = Arc::new(TelegramSender::new(client.clone(), &config.chat));
        let webhook: Arc<dyn WebhookSender> = Arc::new(HttpWebhookSender::new(client.clone()));
        let transfer: Arc<dyn TransferClient> =
            Arc::new(PutioClient::new(client.clone(), &config.transfer));
        let publisher = HttpArticlePublisher::from_config(client, &config.article)
            .map(|p| Arc::new(p) as Arc<dyn ArticlePublisher>);

        Ok(Self::with_parts(
            config, store, fetcher, chat, webhook, transfer, publisher,
        ))
    }

    pub fn with_parts(
        config: Config,
        store: Arc<SqliteStore>,
        fetcher: Arc<dyn Fetcher>,
        chat: Arc<dyn ChatSender>,
        webhook: Arc<dyn WebhookSender>,
        transfer: Arc<dyn TransferClient>,
        publisher: Option<Arc<dyn ArticlePublisher>>,
    ) -> Self {
        let resolver = MagnetResolver::new(fetcher.clone(), config.http.max_torrent_bytes);
        Self {
            config,
            store,
            fetcher,
            resolver,
            chat,
            webhook,
            transfer,
            publisher,
        }
    }

    pub fn distributor(&self) -> Distributor {
        Distributor::new(
            self.store.clone(),
            self.chat.clone(),
            self.webhook.clone(),
            self.transfer.clone(),
            self.config.delivery.clone(),
        )
    }

    pub fn scheduler(&self) -> UpdateScheduler {
        let scheduler = UpdateScheduler::new(
            self.store.clone(),
            FeedFetcher::new(self.fetcher.clone()),
            self.resolver.clone(),
            self.distributor(),
            self.config.engine.clone(),
        );
        match &self.publisher {
            Some(publisher) => {
                scheduler.with_publisher(publisher.clone(), self.config.delivery.preview_chars)
            }
            None => scheduler,
        }
    }

    pub fn service(&self) -> FeedService {
        FeedService::new(
            self.store.clone(),
            FeedFetcher::new(self.fetcher.clone()),
            self.scheduler(),
            self.distributor(),
            self.transfer.clone(),
            self.config.engine.clone(),
        )
    }
}
