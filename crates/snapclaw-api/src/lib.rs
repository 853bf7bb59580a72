pub mod auth;
pub mod config;
pub mod discover;
pub mod groups;
pub mod human;
pub mod messages;
pub mod middleware;
pub mod profiles;
pub mod snaps;
pub mod stories;
pub mod streaks;
pub mod webhooks;

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::config::Config;
use snapclaw_db::Database;
use snapclaw_storage::Storage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub storage: Arc<Storage>,
    pub config: Config,
    pub http: reqwest::Client,
}

/// Stored ids are written by us and should always parse; a corrupt row gets
/// a nil id in the response rather than failing the whole request.
pub(crate) fn parse_id(s: &str) -> Uuid {
    s.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}': {}", s, e);
        Uuid::default()
    })
}

/// Content TTLs are caller-supplied but bounded to [1 hour, 7 days].
pub(crate) fn clamp_ttl_hours(hours: i64) -> i64 {
    hours.clamp(1, 168)
}
