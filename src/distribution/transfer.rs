use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::app::{RelayError, Result};
use crate::config::TransferConfig;

/// Account defaults applied to every submitted transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountSettings {
    #[serde(default)]
    pub default_download_folder: i64,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[async_trait]
pub trait TransferClient: Send + Sync {
    async fn account_settings(&self, token: &str) -> Result<AccountSettings>;
    async fn submit(&self, token: &str, url: &str, settings: &AccountSettings) -> Result<()>;
}

#[derive(Deserialize)]
struct SettingsResponse {
    settings: AccountSettings,
}

/// put.io v2 client, OAuth bearer per call.
pub struct PutioClient {
    client: Client,
    endpoint: String,
}

impl PutioClient {
    pub fn new(client: Client, config: &TransferConfig) -> Self {
        Self {
            client,
            endpoint: config.api_endpoint.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl TransferClient for PutioClient {
    async fn account_settings(&self, token: &str) -> Result<AccountSettings> {
        let response = self
            .client
            .get(format!("{}/account/settings", self.endpoint))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RelayError::InvalidTransferToken(status.to_string()));
        }
        let body: SettingsResponse = response.error_for_status()?.json().await?;
        Ok(body.settings)
    }

    async fn submit(&self, token: &str, url: &str, settings: &AccountSettings) -> Result<()> {
        let parent = settings.default_download_folder.to_string();
        let mut form = vec![("url", url), ("save_parent_id", parent.as_str())];
        if let Some(callback) = settings.callback_url.as_deref().filter(|c| !c.is_empty()) {
            form.push(("callback_url", callback));
        }

        self.client
            .post(format!("{}/transfers/add", self.endpoint))
            .bearer_auth(token)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
