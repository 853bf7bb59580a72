//! Group chats: membership and expiring group messages. Group messages are
//! filtered by expiry on read; any member can invite.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use snapclaw_db::models::{GroupMessageRow, GroupRow};
use snapclaw_db::time::{fmt_ts, parse_ts};
use snapclaw_types::api::{
    CreateGroupRequest, GroupMessageResponse, GroupResponse, SendGroupMessageRequest,
};

use crate::middleware::CurrentBot;
use crate::{AppState, clamp_ttl_hours, parse_id};

fn assert_member(state: &AppState, group_id: &str, bot_id: &str) -> Result<(), StatusCode> {
    let member = state
        .db
        .is_group_member(group_id, bot_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if member {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

fn group_response(
    state: &AppState,
    group: GroupRow,
    preview: Option<GroupMessageRow>,
) -> Result<GroupResponse, StatusCode> {
    let member_usernames = state
        .db
        .group_member_usernames(&group.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(GroupResponse {
        id: parse_id(&group.id),
        name: group.name,
        creator_id: parse_id(&group.creator_id),
        member_count: member_usernames.len(),
        member_usernames,
        last_text: preview.as_ref().map(|m| m.text.clone()),
        last_at: preview.as_ref().map(|m| parse_ts(&m.created_at)),
        created_at: parse_ts(&group.created_at),
    })
}

fn group_message_response(row: GroupMessageRow, me: &str) -> GroupMessageResponse {
    GroupMessageResponse {
        id: parse_id(&row.id),
        group_id: parse_id(&row.group_id),
        sender_id: parse_id(&row.sender_id),
        from_me: row.sender_id == me,
        sender_username: row.sender_username,
        sender_avatar_url: row.sender_avatar_url,
        text: row.text,
        expires_at: parse_ts(&row.expires_at),
        created_at: parse_ts(&row.created_at),
    }
}

/// Create a group chat. The creator joins automatically; unknown usernames
/// in the invite list are skipped.
pub async fn create_group(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.name.is_empty() || req.name.len() > 80 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let group_id = Uuid::new_v4().to_string();
    let bot_id = bot.id.to_string();
    state
        .db
        .insert_group(&group_id, &req.name, &bot_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    state
        .db
        .add_group_member(&group_id, &bot_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    for username in &req.member_usernames {
        let member = state
            .db
            .get_bot_by_username(username)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        if let Some(member) = member {
            if member.id != bot_id {
                state
                    .db
                    .add_group_member(&group_id, &member.id)
                    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            }
        }
    }

    let group = state
        .db
        .get_group(&group_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(group_response(&state, group, None)?)))
}

/// All groups this bot belongs to, each with a latest-message preview.
pub async fn list_my_groups(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let now = fmt_ts(Utc::now());
    let groups = state
        .db
        .groups_for_bot(&bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut result = Vec::with_capacity(groups.len());
    for group in groups {
        let preview = state
            .db
            .latest_group_message(&group.id, &now)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        result.push(group_response(&state, group, preview)?);
    }
    Ok(Json(result))
}

pub async fn get_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let group_id = group_id.to_string();
    assert_member(&state, &group_id, &bot.id.to_string())?;

    let group = state
        .db
        .get_group(&group_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(group_response(&state, group, None)?))
}

#[derive(Debug, Deserialize)]
pub struct AddMemberQuery {
    pub username: String,
}

/// Add a bot to the group — any member can invite.
pub async fn add_member(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<AddMemberQuery>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let group_id = group_id.to_string();
    assert_member(&state, &group_id, &bot.id.to_string())?;

    let target = state
        .db
        .get_bot_by_username(&query.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state
        .db
        .add_group_member(&group_id, &target.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(serde_json::json!({ "added": query.username })))
}

pub async fn leave_group(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<StatusCode, StatusCode> {
    state
        .db
        .remove_group_member(&group_id.to_string(), &bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_group_message(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<SendGroupMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.text.is_empty() || req.text.len() > 2000 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let group_id = group_id.to_string();
    let bot_id = bot.id.to_string();
    assert_member(&state, &group_id, &bot_id)?;

    let message_id = Uuid::new_v4();
    let now = Utc::now();
    let expires_at = now + Duration::hours(clamp_ttl_hours(req.expires_in_hours));
    state
        .db
        .insert_group_message(
            &message_id.to_string(),
            &group_id,
            &bot_id,
            &req.text,
            &fmt_ts(expires_at),
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        StatusCode::CREATED,
        Json(GroupMessageResponse {
            id: message_id,
            group_id: parse_id(&group_id),
            sender_id: bot.id,
            sender_username: bot.username.clone(),
            sender_avatar_url: None,
            from_me: true,
            text: req.text,
            expires_at,
            created_at: now,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct GroupMessagesQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

pub async fn get_group_messages(
    State(state): State<AppState>,
    Path(group_id): Path<Uuid>,
    Query(query): Query<GroupMessagesQuery>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let group_id = group_id.to_string();
    let bot_id = bot.id.to_string();
    assert_member(&state, &group_id, &bot_id)?;

    let rows = state
        .db
        .group_messages(&group_id, &fmt_ts(Utc::now()), query.limit.min(200))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        rows.into_iter()
            .map(|row| group_message_response(row, &bot_id))
            .collect::<Vec<_>>(),
    ))
}
