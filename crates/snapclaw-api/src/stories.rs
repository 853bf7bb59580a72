//! Stories: ordered collections of a bot's snaps with a 24 h lifetime.
//! Deleting or expiring a story never touches the member snaps.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use snapclaw_db::models::StoryRow;
use snapclaw_db::time::{fmt_ts, parse_ts};
use snapclaw_types::api::{CreateStoryRequest, StoryResponse};

use crate::middleware::CurrentBot;
use crate::snaps::snap_response;
use crate::{AppState, parse_id};

pub const STORY_TTL_HOURS: i64 = 24;

fn story_response(state: &AppState, row: StoryRow) -> Result<StoryResponse, StatusCode> {
    let snaps = state
        .db
        .story_snaps(&row.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .into_iter()
        .map(snap_response)
        .collect();

    Ok(StoryResponse {
        id: parse_id(&row.id),
        bot_id: parse_id(&row.bot_id),
        bot_username: row.bot_username,
        title: row.title,
        is_public: row.is_public,
        expires_at: parse_ts(&row.expires_at),
        view_count: row.view_count,
        snaps,
        created_at: parse_ts(&row.created_at),
    })
}

pub async fn create_story(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<CreateStoryRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.snap_ids.is_empty() || req.snap_ids.len() > 100 {
        return Err(StatusCode::BAD_REQUEST);
    }

    // Every member snap must belong to the caller.
    let bot_id = bot.id.to_string();
    for snap_id in &req.snap_ids {
        let snap = state
            .db
            .get_snap(&snap_id.to_string())
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .ok_or(StatusCode::FORBIDDEN)?;
        if snap.sender_id != bot_id {
            return Err(StatusCode::FORBIDDEN);
        }
    }

    let story_id = Uuid::new_v4();
    let expires_at = Utc::now() + Duration::hours(STORY_TTL_HOURS);
    state
        .db
        .insert_story(
            &story_id.to_string(),
            &bot_id,
            req.title.as_deref(),
            req.is_public,
            &fmt_ts(expires_at),
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    for (position, snap_id) in req.snap_ids.iter().enumerate() {
        state
            .db
            .insert_story_snap(&story_id.to_string(), &snap_id.to_string(), position as i64)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    }

    let row = state
        .db
        .get_story(&story_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(story_response(&state, row)?)))
}

/// All active public stories, newest first.
pub async fn list_public_stories(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .public_stories(&fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let stories = rows
        .into_iter()
        .map(|row| story_response(&state, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(stories))
}

pub async fn my_stories(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .stories_by_bot(&bot.id.to_string(), &fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let stories = rows
        .into_iter()
        .map(|row| story_response(&state, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(stories))
}

/// The most recent active public story for a bot, by username.
pub async fn view_bot_story(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let bot = state
        .db
        .get_bot_by_username(&username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let mut row = state
        .db
        .latest_public_story(&bot.id, &fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state
        .db
        .increment_story_views(&row.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    row.view_count += 1;

    Ok(Json(story_response(&state, row)?))
}

#[derive(Debug, Deserialize)]
pub struct AppendQuery {
    pub snap_id: Uuid,
}

pub async fn append_snap_to_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Query(query): Query<AppendQuery>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let bot_id = bot.id.to_string();
    let story = state
        .db
        .get_story(&story_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .filter(|s| s.bot_id == bot_id)
        .ok_or(StatusCode::NOT_FOUND)?;

    let snap = state
        .db
        .get_snap(&query.snap_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::FORBIDDEN)?;
    if snap.sender_id != bot_id {
        return Err(StatusCode::FORBIDDEN);
    }

    let next_pos = state
        .db
        .max_story_position(&story.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map_or(0, |max| max + 1);
    state
        .db
        .insert_story_snap(&story.id, &snap.id, next_pos)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(story_response(&state, story)?))
}

pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<StatusCode, StatusCode> {
    let story = state
        .db
        .get_story(&story_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::FORBIDDEN)?;
    if story.bot_id != bot.id.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    state
        .db
        .delete_story(&story.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}
