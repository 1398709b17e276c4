use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Response from {url} exceeds {limit} bytes")]
    TooLarge { url: String, limit: usize },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Subscription not found")]
    SubscriptionNotFound,

    #[error("Already subscribed to {0}")]
    AlreadySubscribed(String),

    #[error("No transfer token configured, set one before enabling transfers")]
    MissingTransferToken,

    #[error("Invalid transfer token: {0}")]
    InvalidTransferToken(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Outcome classification for a failed chat delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    /// The recipient removed or blocked the bot; retrying is pointless.
    #[error("recipient unreachable: {0}")]
    Blocked(String),

    #[error("transient failure: {0}")]
    Transient(String),
}

impl SendError {
    pub fn is_blocked(&self) -> bool {
        matches!(self, SendError::Blocked(_))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
