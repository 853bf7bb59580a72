//! Streak read endpoints. All mutation happens in snapclaw-core, driven by
//! snap sends and the sweeper.

use axum::{
    Extension, Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use snapclaw_db::time::parse_ts;
use snapclaw_types::api::{LeaderboardEntry, StreakResponse};

use crate::middleware::CurrentBot;
use crate::{AppState, parse_id};

/// This bot's streaks, strongest first, with the partner resolved to a
/// username.
pub async fn my_streaks(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let bot_id = bot.id.to_string();
    let rows = state
        .db
        .streaks_for_bot(&bot_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut streaks = Vec::with_capacity(rows.len());
    for row in rows {
        let partner_id = if row.low_bot_id == bot_id {
            &row.high_bot_id
        } else {
            &row.low_bot_id
        };
        let partner_username = state
            .db
            .get_bot_by_id(partner_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
            .map(|b| b.username)
            .unwrap_or_else(|| "unknown".to_string());

        streaks.push(StreakResponse {
            id: parse_id(&row.id),
            partner_id: parse_id(partner_id),
            partner_username,
            count: row.count,
            last_snap_at: parse_ts(&row.last_snap_at),
            at_risk: row.at_risk,
            created_at: parse_ts(&row.created_at),
        });
    }
    Ok(Json(streaks))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    20
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .top_streaks(query.limit.min(100))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let username = |id: &str| -> Result<String, StatusCode> {
            Ok(state
                .db
                .get_bot_by_id(id)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .map(|b| b.username)
                .unwrap_or_else(|| "?".to_string()))
        };
        entries.push(LeaderboardEntry {
            low_username: username(&row.low_bot_id)?,
            high_username: username(&row.high_bot_id)?,
            count: row.count,
            at_risk: row.at_risk,
        });
    }
    Ok(Json(entries))
}
