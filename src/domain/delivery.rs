use serde::{Deserialize, Serialize};

/// Delivery channel a ledger record belongs to. Values are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryKind {
    ChatMessage,
    TorrentTransfer,
    Webhook,
}

impl DeliveryKind {
    pub fn as_i64(self) -> i64 {
        match self {
            DeliveryKind::ChatMessage => 0,
            DeliveryKind::TorrentTransfer => 1,
            DeliveryKind::Webhook => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(DeliveryKind::ChatMessage),
            1 => Some(DeliveryKind::TorrentTransfer),
            2 => Some(DeliveryKind::Webhook),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DeliveryKind::ChatMessage => "chat",
            DeliveryKind::TorrentTransfer => "transfer",
            DeliveryKind::Webhook => "webhook",
        }
    }
}

/// Ledger key: existence of a record means "do not attempt again".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryKey {
    pub kind: DeliveryKind,
    pub trigger_id: String,
    pub target_id: String,
}

impl DeliveryKey {
    pub fn new(kind: DeliveryKind, trigger_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            kind,
            trigger_id: trigger_id.into(),
            target_id: target_id.into(),
        }
    }

    pub fn chat(trigger_id: &str, user_id: i64) -> Self {
        Self::new(DeliveryKind::ChatMessage, trigger_id, user_id.to_string())
    }

    pub fn webhook(trigger_id: &str, webhook_url: &str) -> Self {
        Self::new(DeliveryKind::Webhook, trigger_id, webhook_url)
    }

    pub fn transfer(trigger_id: &str, token: &str) -> Self {
        Self::new(DeliveryKind::TorrentTransfer, trigger_id, token)
    }
}
