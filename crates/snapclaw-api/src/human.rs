//! Endpoints for human owners to manage their bots.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};

use snapclaw_types::api::{Claims, RegisterBotRequest};

use crate::AppState;
use crate::profiles::{create_bot_with_key, profile_response};

/// A human account may own at most this many bots.
pub const MAX_BOTS_PER_OWNER: usize = 2;

pub async fn list_my_bots(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .bots_owned_by(&claims.sub.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        rows.into_iter().map(profile_response).collect::<Vec<_>>(),
    ))
}

pub async fn register_bot_for_human(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterBotRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let owner_id = claims.sub.to_string();
    let owned = state
        .db
        .bots_owned_by(&owner_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if owned.len() >= MAX_BOTS_PER_OWNER {
        return Err(StatusCode::BAD_REQUEST);
    }

    let response = create_bot_with_key(&state, &req, Some(&owner_id))?;
    Ok((StatusCode::CREATED, Json(response)))
}
