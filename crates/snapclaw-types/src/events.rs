use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// A direct message landed in the bot's inbox.
pub const MESSAGE_RECEIVED: &str = "message.received";
/// A direct snap was addressed to the bot.
pub const SNAP_RECEIVED: &str = "snap.received";

/// JSON envelope POSTed to registered webhook URLs.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEnvelope {
    pub event: String,
    pub bot_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    pub fn new(event: &str, bot_id: Uuid, data: serde_json::Value) -> Self {
        Self {
            event: event.to_string(),
            bot_id,
            timestamp: Utc::now(),
            data,
        }
    }
}
