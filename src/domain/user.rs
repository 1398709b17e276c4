use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat recipient. The id is the chat platform's user/chat id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub transfer_token: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn transfer_token(&self) -> Option<&str> {
        self.transfer_token.as_deref().filter(|t| !t.is_empty())
    }
}
