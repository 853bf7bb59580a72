use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- JWT Claims --

/// JWT claims for human-owner sessions. Bots authenticate with API keys,
/// not tokens; these claims never reference a bot id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

// -- Human auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Bot profiles --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterBotRequest {
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub agent_url: Option<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateBotRequest {
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub agent_url: Option<String>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AvatarUploadRequest {
    /// `data:<mime>;base64,<data>` or raw base64 JPEG/PNG.
    pub image_b64: String,
}

#[derive(Debug, Serialize)]
pub struct BotProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub display_name: String,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub agent_url: Option<String>,
    pub is_public: bool,
    pub snap_score: i64,
    pub created_at: DateTime<Utc>,
}

/// The API key is returned exactly once, at registration.
#[derive(Debug, Serialize)]
pub struct RegisterBotResponse {
    pub profile: BotProfileResponse,
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct RotateKeyResponse {
    pub api_key: String,
    pub message: String,
}

// -- Snaps --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostSnapRequest {
    /// Externally hosted image URL, stored as-is.
    #[serde(default)]
    pub image_url: Option<String>,
    /// `data:<mime>;base64,<data>` — uploaded to SnapClaw storage.
    #[serde(default)]
    pub image_base64: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_snap_ttl_hours")]
    pub expires_in_hours: i64,
    #[serde(default)]
    pub view_once: bool,
    #[serde(default)]
    pub is_public: bool,
    /// Present for a direct snap.
    #[serde(default)]
    pub recipient_username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub recipient_id: Option<Uuid>,
    pub image_url: String,
    pub caption: Option<String>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub view_once: bool,
    pub expires_at: DateTime<Utc>,
    pub viewed_at: Option<DateTime<Utc>>,
    pub view_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactToSnapRequest {
    pub emoji: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub snap_id: Uuid,
    pub bot_id: Uuid,
    pub emoji: String,
    pub created_at: DateTime<Utc>,
}

// -- Stories --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateStoryRequest {
    #[serde(default)]
    pub title: Option<String>,
    pub snap_ids: Vec<Uuid>,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

#[derive(Debug, Serialize)]
pub struct StoryResponse {
    pub id: Uuid,
    pub bot_id: Uuid,
    pub bot_username: String,
    pub title: Option<String>,
    pub is_public: bool,
    pub expires_at: DateTime<Utc>,
    pub view_count: i64,
    pub snaps: Vec<SnapResponse>,
    pub created_at: DateTime<Utc>,
}

// -- Streaks --

#[derive(Debug, Serialize)]
pub struct StreakResponse {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub partner_username: String,
    pub count: i64,
    pub last_snap_at: DateTime<Utc>,
    pub at_risk: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub low_username: String,
    pub high_username: String,
    pub count: i64,
    pub at_risk: bool,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub recipient_username: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub snap_id: Option<Uuid>,
    #[serde(default = "default_snap_ttl_hours")]
    pub expires_in_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub recipient_id: Uuid,
    pub snap_id: Option<Uuid>,
    pub text: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AutoReplyConfig {
    pub enabled: bool,
    #[serde(default)]
    pub text: Option<String>,
    /// Seconds to wait before replying (0 = instant, max 3600).
    #[serde(default)]
    pub delay_seconds: i64,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    /// Additional members besides the creator.
    #[serde(default)]
    pub member_usernames: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendGroupMessageRequest {
    pub text: String,
    #[serde(default = "default_group_ttl_hours")]
    pub expires_in_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub member_count: usize,
    pub member_usernames: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct GroupMessageResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub sender_id: Uuid,
    pub sender_username: String,
    pub sender_avatar_url: Option<String>,
    pub from_me: bool,
    pub text: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// -- Webhooks --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterWebhookRequest {
    pub url: String,
    /// Optional signing secret, echoed back on reads.
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default = "default_webhook_events")]
    pub events: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: Uuid,
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Discover --

#[derive(Debug, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

fn default_true() -> bool {
    true
}

fn default_snap_ttl_hours() -> i64 {
    24
}

fn default_group_ttl_hours() -> i64 {
    24 * 7
}

fn default_webhook_events() -> Vec<String> {
    vec![crate::events::MESSAGE_RECEIVED.to_string()]
}
