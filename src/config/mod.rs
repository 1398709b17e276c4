//! Configuration management for feedrelay.
//!
//! Configuration is read from `~/.config/feedrelay/config.toml` unless a
//! path is given. If the default file doesn't exist, one with comments is
//! created. Every section falls back to defaults for missing fields.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::torrent::DEFAULT_MAX_TORRENT_BYTES;

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub http: HttpConfig,
    pub delivery: DeliveryConfig,
    pub chat: ChatConfig,
    pub transfer: TransferConfig,
    pub article: ArticleConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minutes between scheduler ticks.
    pub tick_minutes: u32,
    /// Consecutive failures after which a source is suspended.
    pub error_threshold: u32,
    /// Maximum concurrent source fetches.
    pub workers: usize,
    pub default_interval_minutes: u32,
    /// Seed a new source's existing items as already seen.
    pub suppress_initial_items: bool,
    /// How long `stop` waits for in-flight work before abandoning it.
    pub drain_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_minutes: 1,
            error_threshold: 100,
            workers: 10,
            default_interval_minutes: 1,
            suppress_initial_items: true,
            drain_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.tick_minutes.max(1)) * 60)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    /// Error count written to mark a source suspended.
    pub fn suspended_sentinel(&self) -> u32 {
        self.error_threshold.saturating_add(1)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
    pub max_torrent_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            user_agent: concat!("feedrelay/", env!("CARGO_PKG_VERSION")).to_string(),
            max_torrent_bytes: DEFAULT_MAX_TORRENT_BYTES,
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

pub const DEFAULT_MESSAGE_TEMPLATE: &str =
    "<b>{source_title}</b>\n<a href=\"{link}\">{content_title}</a>\n{preview_text}{article_url}{tags}";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Preview length in characters; 0 disables previews.
    pub preview_chars: usize,
    pub parse_mode: String,
    pub disable_web_page_preview: bool,
    pub message_template: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            preview_chars: 0,
            parse_mode: "HTML".to_string(),
            disable_web_page_preview: false,
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_endpoint: String,
    pub bot_token: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.telegram.org".to_string(),
            bot_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub api_endpoint: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.put.io/v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ArticleConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub access_token: String,
    pub author_name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `path`, or from the default path.
    ///
    /// A missing default file is created with comments; a missing
    /// explicit path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let p = Self::default_config_path()?;
                if !p.exists() {
                    Self::create_default_config(&p)?;
                    return Ok(Self::default());
                }
                p
            }
        };

        let content = fs::read_to_string(&config_path).map_err(|e| ConfigError::Io {
            path: config_path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path,
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/feedrelay/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("feedrelay").join("config.toml"))
    }

    /// Database file, defaulting to `<data_dir>/feedrelay/feedrelay.db`.
    pub fn database_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(path) = &self.database.path {
            return Ok(path.clone());
        }
        let data_dir = dirs::data_dir().ok_or(ConfigError::NoConfigDir)?;
        let dir = data_dir.join("feedrelay");
        fs::create_dir_all(&dir).map_err(|e| ConfigError::Io {
            path: dir.clone(),
            source: e,
        })?;
        Ok(dir.join("feedrelay.db"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> String {
        r##"# feedrelay configuration

[engine]
# Minutes between scheduler ticks
tick_minutes = 1
# Consecutive fetch failures before a source is paused
error_threshold = 100
# Concurrent feed fetches
workers = 10
# Poll interval given to new subscriptions, in minutes
default_interval_minutes = 1
# Treat a new feed's existing items as already delivered
suppress_initial_items = true
# Seconds to wait for in-flight work on shutdown
drain_timeout_secs = 30

[http]
timeout_secs = 15
max_torrent_bytes = 10485760

[delivery]
# Characters of item text shown in messages (0 = none)
preview_chars = 0
parse_mode = "HTML"
disable_web_page_preview = false

[chat]
api_endpoint = "https://api.telegram.org"
bot_token = ""

[transfer]
api_endpoint = "https://api.put.io/v2"

[article]
enabled = false
endpoint = ""
access_token = ""
author_name = ""
"##
        .to_string()
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
