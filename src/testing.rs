//! In-process fakes for the network collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::app::{RelayError, Result, SendError};
use crate::distribution::{
    AccountSettings, ArticleDraft, ArticlePublisher, ChatSender, MessageOptions, TransferClient,
    WebhookPayload, WebhookSender,
};
use crate::fetcher::Fetcher;

/// Serves canned bodies by URL; unknown URLs fail.
#[derive(Default)]
pub struct StaticFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, body: &str) {
        self.set_bytes(url, body.as_bytes().to_vec());
    }

    pub fn set_bytes(&self, url: &str, body: Vec<u8>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body);
    }

    pub fn remove(&self, url: &str) {
        self.bodies.lock().unwrap().remove(url);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| RelayError::Other(format!("no response for {}", url)))
    }
}

#[derive(Default)]
pub struct FakeChat {
    sent: Mutex<Vec<(i64, String)>>,
    attempts: Mutex<HashMap<i64, usize>>,
    blocked: Mutex<HashSet<i64>>,
    transient: AtomicBool,
}

impl FakeChat {
    pub fn block(&self, user_id: i64) {
        self.blocked.lock().unwrap().insert(user_id);
    }

    pub fn fail_transiently(&self, fail: bool) {
        self.transient.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, user_id: i64) -> usize {
        self.sent().iter().filter(|(id, _)| *id == user_id).count()
    }

    pub fn attempts_for(&self, user_id: i64) -> usize {
        self.attempts.lock().unwrap().get(&user_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ChatSender for FakeChat {
    async fn send(
        &self,
        recipient: i64,
        text: &str,
        _options: &MessageOptions,
    ) -> std::result::Result<(), SendError> {
        *self.attempts.lock().unwrap().entry(recipient).or_default() += 1;
        if self.blocked.lock().unwrap().contains(&recipient) {
            return Err(SendError::Blocked("Forbidden: bot was blocked by the user".into()));
        }
        if self.transient.load(Ordering::SeqCst) {
            return Err(SendError::Transient("timeout".into()));
        }
        self.sent.lock().unwrap().push((recipient, text.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWebhook {
    posted: Mutex<Vec<(String, WebhookPayload)>>,
    failing: AtomicBool,
}

impl FakeWebhook {
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn posted(&self) -> Vec<(String, WebhookPayload)> {
        self.posted.lock().unwrap().clone()
    }
}

#[async_trait]
impl WebhookSender for FakeWebhook {
    async fn post(&self, url: &str, payload: &WebhookPayload) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::Other(format!("webhook {} returned 500", url)));
        }
        self.posted
            .lock()
            .unwrap()
            .push((url.to_string(), payload.clone()));
        Ok(())
    }
}

/// Accepts only the tokens it was given.
#[derive(Default)]
pub struct FakeTransfer {
    tokens: HashSet<String>,
    submitted: Mutex<Vec<(String, String)>>,
    settings_calls: AtomicUsize,
}

impl FakeTransfer {
    pub fn with_token(token: &str) -> Self {
        Self {
            tokens: HashSet::from([token.to_string()]),
            ..Default::default()
        }
    }

    pub fn submitted(&self) -> Vec<(String, String)> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn settings_calls(&self) -> usize {
        self.settings_calls.load(Ordering::SeqCst)
    }

    fn check(&self, token: &str) -> Result<()> {
        if self.tokens.contains(token) {
            Ok(())
        } else {
            Err(RelayError::InvalidTransferToken("401 Unauthorized".into()))
        }
    }
}

#[async_trait]
impl TransferClient for FakeTransfer {
    async fn account_settings(&self, token: &str) -> Result<AccountSettings> {
        self.settings_calls.fetch_add(1, Ordering::SeqCst);
        self.check(token)?;
        Ok(AccountSettings {
            default_download_folder: 7,
            callback_url: None,
        })
    }

    async fn submit(&self, token: &str, url: &str, _settings: &AccountSettings) -> Result<()> {
        self.check(token)?;
        self.submitted
            .lock()
            .unwrap()
            .push((token.to_string(), url.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakePublisher {
    published: Mutex<Vec<String>>,
    failing: AtomicBool,
}

impl FakePublisher {
    pub fn fail(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArticlePublisher for FakePublisher {
    async fn publish(&self, draft: &ArticleDraft<'_>) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RelayError::Other("article service unavailable".into()));
        }
        let mut published = self.published.lock().unwrap();
        published.push(draft.title.to_string());
        Ok(format!("https://paste.example/p/{}", published.len()))
    }
}
