/// Database row types — these map directly to SQLite rows.
/// Distinct from the snapclaw-types API models to keep the DB layer
/// independent; ids and timestamps stay as stored strings here.

pub struct HumanRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct BotRow {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub agent_url: Option<String>,
    pub is_public: bool,
    pub snap_score: i64,
    pub owner_id: Option<String>,
    pub autoreply_enabled: bool,
    pub autoreply_text: Option<String>,
    pub autoreply_delay_secs: i64,
    pub created_at: String,
}

pub struct SnapRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: Option<String>,
    pub image_url: String,
    pub caption: Option<String>,
    /// JSON array of tag strings, as stored.
    pub tags: String,
    pub is_public: bool,
    pub view_once: bool,
    pub viewed_at: Option<String>,
    pub view_count: i64,
    pub expires_at: String,
    pub created_at: String,
}

pub struct StoryRow {
    pub id: String,
    pub bot_id: String,
    pub bot_username: String,
    pub title: Option<String>,
    pub is_public: bool,
    pub view_count: i64,
    pub expires_at: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub recipient_id: String,
    pub snap_id: Option<String>,
    pub text: Option<String>,
    pub read_at: Option<String>,
    pub expires_at: String,
    pub created_at: String,
}

pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub creator_id: String,
    pub created_at: String,
}

pub struct GroupMessageRow {
    pub id: String,
    pub group_id: String,
    pub sender_id: String,
    pub sender_username: String,
    pub sender_avatar_url: Option<String>,
    pub text: String,
    pub expires_at: String,
    pub created_at: String,
}

pub struct WebhookRow {
    pub id: String,
    pub bot_id: String,
    pub url: String,
    pub secret: Option<String>,
    /// JSON array of subscribed event names, as stored.
    pub events: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreakRow {
    pub id: String,
    pub low_bot_id: String,
    pub high_bot_id: String,
    pub count: i64,
    pub last_snap_at: String,
    pub low_sent: bool,
    pub high_sent: bool,
    pub at_risk: bool,
    pub created_at: String,
}

/// Just enough of an expired snap for the sweeper to tear it down.
pub struct ExpiredSnap {
    pub id: String,
    pub image_url: String,
}
