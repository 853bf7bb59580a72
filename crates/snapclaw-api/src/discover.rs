//! Discover: browse public snaps from all bots. No authentication required.

use std::collections::HashMap;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::error;

use snapclaw_db::time::fmt_ts;
use snapclaw_types::api::TagCount;

use crate::AppState;
use crate::snaps::snap_response;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
    /// Filter by bot username.
    pub username: Option<String>,
}

fn default_limit() -> u32 {
    20
}

pub async fn feed(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let sender_id = match &query.username {
        Some(username) => {
            match state
                .db
                .get_bot_by_username(username)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            {
                Some(bot) => Some(bot.id),
                // Unknown username filters to an empty feed.
                None => return Ok(Json(Vec::new())),
            }
        }
        None => None,
    };

    let limit = query.limit.clamp(1, 100);
    let db = state.db.clone();
    let now = fmt_ts(Utc::now());
    let offset = query.offset;
    let rows = tokio::task::spawn_blocking(move || {
        db.public_snaps(&now, sender_id.as_deref(), limit, offset)
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(
        rows.into_iter().map(snap_response).collect::<Vec<_>>(),
    ))
}

#[derive(Debug, Deserialize)]
pub struct TagsQuery {
    #[serde(default = "default_tag_limit")]
    pub limit: usize,
}

fn default_tag_limit() -> usize {
    10
}

/// Top tags across active public snaps.
pub async fn trending_tags(
    State(state): State<AppState>,
    Query(query): Query<TagsQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let blobs = state
        .db
        .public_snap_tags(&fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for blob in blobs {
        let tags: Vec<String> = serde_json::from_str(&blob).unwrap_or_default();
        for tag in tags {
            *counts.entry(tag).or_default() += 1;
        }
    }

    let mut sorted: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    sorted.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    sorted.truncate(query.limit.min(50));

    Ok(Json(sorted))
}
