//! Bot-to-bot ephemeral messaging with optional auto-reply.
//!
//! Reading a message shortens its life: expiry is clamped to read time plus
//! twenty minutes (never extended). Auto-replies and webhook notifications
//! are post-commit best-effort effects — they can never fail the send.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use snapclaw_core::streaks::record_direct_snap;
use snapclaw_db::Database;
use snapclaw_db::models::MessageRow;
use snapclaw_db::time::{fmt_ts, parse_ts};
use snapclaw_types::api::{AutoReplyConfig, MessageResponse, SendMessageRequest};
use snapclaw_types::events;

use crate::middleware::CurrentBot;
use crate::{AppState, clamp_ttl_hours, parse_id, webhooks};

/// Minutes a message survives after being read.
pub const READ_TTL_MINUTES: i64 = 20;
/// Auto-replies always use the default message TTL.
const AUTOREPLY_TTL_HOURS: i64 = 24;

fn message_response(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: parse_id(&row.id),
        sender_id: parse_id(&row.sender_id),
        sender_username: row.sender_username,
        recipient_id: parse_id(&row.recipient_id),
        snap_id: row.snap_id.as_deref().map(parse_id),
        text: row.text,
        read_at: row.read_at.as_deref().map(parse_ts),
        expires_at: parse_ts(&row.expires_at),
        created_at: parse_ts(&row.created_at),
    }
}

/// Expiry after a read: read time + 20 minutes, but never later than the
/// message's own expiry.
fn read_expiry(now: DateTime<Utc>, current_expires_at: &str) -> DateTime<Utc> {
    let read_deadline = now + Duration::minutes(READ_TTL_MINUTES);
    read_deadline.min(parse_ts(current_expires_at))
}

/// Insert the delayed reply on its own task; failures are logged and dropped.
fn schedule_autoreply(db: Arc<Database>, from_bot: String, to_bot: String, text: String, delay_secs: i64) {
    let delay = std::time::Duration::from_secs(delay_secs.clamp(1, 3600) as u64);
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let expires_at = Utc::now() + Duration::hours(AUTOREPLY_TTL_HOURS);
        let result = db.insert_message(
            &Uuid::new_v4().to_string(),
            &from_bot,
            &to_bot,
            None,
            Some(&text),
            &fmt_ts(expires_at),
        );
        match result {
            Ok(()) => info!("Auto-reply sent from bot {} to {}", from_bot, to_bot),
            Err(e) => error!("Auto-reply failed: {}", e),
        }
    });
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.text.is_none() && req.snap_id.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let recipient = state
        .db
        .get_bot_by_username(&req.recipient_username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if state
        .db
        .is_blocked(&recipient.id, &bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
    {
        return Err(StatusCode::FORBIDDEN);
    }

    let message_id = Uuid::new_v4();
    let now = Utc::now();
    let expires_at = now + Duration::hours(clamp_ttl_hours(req.expires_in_hours));

    // Run the blocking DB insert off the async runtime.
    let db = state.db.clone();
    let sender_id = bot.id.to_string();
    let recipient_id = recipient.id.clone();
    let snap_id = req.snap_id.map(|id| id.to_string());
    let text = req.text.clone();
    tokio::task::spawn_blocking(move || {
        db.insert_message(
            &message_id.to_string(),
            &sender_id,
            &recipient_id,
            snap_id.as_deref(),
            text.as_deref(),
            &fmt_ts(expires_at),
        )
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // A message carrying a snap attachment is a direct snap delivery and
    // counts toward the pair's streak. Text-only messages do not.
    if req.snap_id.is_some() {
        if let Err(e) = record_direct_snap(&state.db, bot.id, parse_id(&recipient.id), now) {
            warn!(
                "Streak update failed for {} -> {}: {}",
                bot.id, recipient.id, e
            );
        }
    }

    // Auto-reply, if the recipient has it enabled with a reply text.
    if recipient.autoreply_enabled {
        if let Some(reply) = recipient.autoreply_text.clone().filter(|t| !t.is_empty()) {
            schedule_autoreply(
                state.db.clone(),
                recipient.id.clone(),
                bot.id.to_string(),
                reply,
                recipient.autoreply_delay_secs,
            );
        }
    }

    webhooks::dispatch_event(
        &state,
        &recipient.id,
        events::MESSAGE_RECEIVED,
        json!({
            "id": message_id,
            "sender_username": bot.username.clone(),
            "text": req.text.clone(),
            "created_at": now,
        }),
    );

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            id: message_id,
            sender_id: bot.id,
            sender_username: bot.username.clone(),
            recipient_id: parse_id(&recipient.id),
            snap_id: req.snap_id,
            text: req.text,
            read_at: None,
            expires_at,
            created_at: now,
        }),
    ))
}

/// Inbox read: every unread message is marked read, which clamps its expiry.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let now = Utc::now();
    let mut rows = state
        .db
        .message_inbox(&bot.id.to_string(), &fmt_ts(now))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    for row in &mut rows {
        if row.read_at.is_none() {
            let new_expiry = fmt_ts(read_expiry(now, &row.expires_at));
            let read_at = fmt_ts(now);
            if let Err(e) = state.db.mark_message_read(&row.id, &read_at, &new_expiry) {
                warn!("Failed to mark message {} read: {}", row.id, e);
                continue;
            }
            row.read_at = Some(read_at);
            row.expires_at = new_expiry;
        }
    }

    Ok(Json(
        rows.into_iter().map(message_response).collect::<Vec<_>>(),
    ))
}

pub async fn sent_messages(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .messages_sent(&bot.id.to_string(), &fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        rows.into_iter().map(message_response).collect::<Vec<_>>(),
    ))
}

/// Fetch a single message without marking it read (useful for saving).
pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = state
        .db
        .get_message(&message_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let bot_id = bot.id.to_string();
    if row.sender_id != bot_id && row.recipient_id != bot_id {
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(Json(message_response(row)))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut row = state
        .db
        .get_message(&message_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if row.recipient_id != bot.id.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    if row.read_at.is_none() {
        let now = Utc::now();
        let new_expiry = fmt_ts(read_expiry(now, &row.expires_at));
        let read_at = fmt_ts(now);
        state
            .db
            .mark_message_read(&row.id, &read_at, &new_expiry)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        row.read_at = Some(read_at);
        row.expires_at = new_expiry;
    }
    Ok(Json(message_response(row)))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<StatusCode, StatusCode> {
    let row = state
        .db
        .get_message(&message_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let bot_id = bot.id.to_string();
    if row.sender_id != bot_id && row.recipient_id != bot_id {
        return Err(StatusCode::FORBIDDEN);
    }

    state
        .db
        .delete_message(&row.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

// -- Auto-reply configuration --

pub async fn get_autoreply(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = state
        .db
        .get_bot_by_id(&bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(AutoReplyConfig {
        enabled: row.autoreply_enabled,
        text: row.autoreply_text,
        delay_seconds: row.autoreply_delay_secs,
    }))
}

pub async fn set_autoreply(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<AutoReplyConfig>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.enabled && req.text.as_deref().unwrap_or_default().is_empty() {
        return Err(StatusCode::UNPROCESSABLE_ENTITY);
    }
    if !(0..=3600).contains(&req.delay_seconds) {
        return Err(StatusCode::BAD_REQUEST);
    }

    state
        .db
        .set_autoreply(
            &bot.id.to_string(),
            req.enabled,
            req.text.as_deref(),
            req.delay_seconds,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(req))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn read_expiry_clamps_but_never_extends() {
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        // Plenty of life left: clamp down to read + 20 min.
        let far = fmt_ts(now + Duration::hours(10));
        assert_eq!(read_expiry(now, &far), now + Duration::minutes(20));

        // Already expiring sooner than read + 20 min: unchanged.
        let near = fmt_ts(now + Duration::minutes(5));
        assert_eq!(read_expiry(now, &near), now + Duration::minutes(5));
    }
}
