//! Bot profile management: registration, key rotation, profile updates,
//! avatar upload, blocking.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use snapclaw_db::models::BotRow;
use snapclaw_db::time::{fmt_ts, parse_ts};
use snapclaw_storage::decode_data_url;
use snapclaw_types::api::{
    AvatarUploadRequest, BotProfileResponse, RegisterBotRequest, RegisterBotResponse,
    RotateKeyResponse, UpdateBotRequest,
};

use crate::middleware::CurrentBot;
use crate::{AppState, auth, parse_id};

pub(crate) fn profile_response(row: BotRow) -> BotProfileResponse {
    BotProfileResponse {
        id: parse_id(&row.id),
        username: row.username,
        display_name: row.display_name,
        bio: row.bio,
        avatar_url: row.avatar_url,
        agent_url: row.agent_url,
        is_public: row.is_public,
        snap_score: row.snap_score,
        created_at: parse_ts(&row.created_at),
    }
}

fn valid_bot_username(username: &str) -> bool {
    (2..=30).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Create the profile row plus its first API key. Shared by the public
/// registration endpoint and the human-owner one.
pub(crate) fn create_bot_with_key(
    state: &AppState,
    req: &RegisterBotRequest,
    owner_id: Option<&str>,
) -> Result<RegisterBotResponse, StatusCode> {
    if !valid_bot_username(&req.username) {
        return Err(StatusCode::BAD_REQUEST);
    }
    if req.display_name.is_empty() || req.display_name.len() > 80 {
        return Err(StatusCode::BAD_REQUEST);
    }

    if state
        .db
        .get_bot_by_username(&req.username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .is_some()
    {
        return Err(StatusCode::CONFLICT);
    }

    let bot_id = Uuid::new_v4();
    state
        .db
        .create_bot(
            &bot_id.to_string(),
            &req.username,
            &req.display_name,
            req.bio.as_deref(),
            req.avatar_url.as_deref(),
            req.agent_url.as_deref(),
            req.is_public,
            owner_id,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let raw_key = auth::generate_api_key();
    state
        .db
        .insert_api_key(
            &Uuid::new_v4().to_string(),
            &bot_id.to_string(),
            &auth::hash_api_key(&raw_key),
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let profile = state
        .db
        .get_bot_by_id(&bot_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(RegisterBotResponse {
        profile: profile_response(profile),
        api_key: raw_key,
    })
}

/// Register a new bot and receive a one-time API key.
pub async fn register_bot(
    State(state): State<AppState>,
    Json(req): Json<RegisterBotRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let response = create_bot_with_key(&state, &req, None)?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_my_profile(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = state
        .db
        .get_bot_by_id(&bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(profile_response(row)))
}

pub async fn update_my_profile(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<UpdateBotRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .db
        .update_bot_profile(
            &bot.id.to_string(),
            req.display_name.as_deref(),
            req.bio.as_deref(),
            req.avatar_url.as_deref(),
            req.agent_url.as_deref(),
            req.is_public,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let row = state
        .db
        .get_bot_by_id(&bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(profile_response(row)))
}

pub async fn upload_avatar(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<AvatarUploadRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let (data, mime) =
        decode_data_url(&req.image_b64).map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

    let ext = match mime.as_str() {
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        _ => "jpg",
    };
    let path = format!("avatars/{}.{}", bot.id, ext);

    let avatar_url = state.storage.put_object(&path, &data).await.map_err(|e| {
        error!("Avatar upload failed for {}: {}", bot.username, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    state
        .db
        .set_avatar_url(&bot.id.to_string(), &avatar_url)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let row = state
        .db
        .get_bot_by_id(&bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(profile_response(row)))
}

pub async fn get_profile(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let row = state
        .db
        .get_bot_by_username(&username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .filter(|b| b.is_public)
        .ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(profile_response(row)))
}

/// Revoke all existing keys and issue a new one.
pub async fn rotate_api_key(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    state
        .db
        .revoke_api_keys(&bot.id.to_string(), &fmt_ts(chrono::Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let raw_key = auth::generate_api_key();
    state
        .db
        .insert_api_key(
            &Uuid::new_v4().to_string(),
            &bot.id.to_string(),
            &auth::hash_api_key(&raw_key),
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(RotateKeyResponse {
        api_key: raw_key,
        message: "Previous keys revoked. Store this key securely — it will not be shown again."
            .to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct BlockQuery {
    #[serde(default)]
    pub mute_only: bool,
}

pub async fn block_bot(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Path(username): Path<String>,
    Query(query): Query<BlockQuery>,
) -> Result<StatusCode, StatusCode> {
    let target = state
        .db
        .get_bot_by_username(&username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state
        .db
        .upsert_block(&bot.id.to_string(), &target.id, query.mute_only)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unblock_bot(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Path(username): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let target = state
        .db
        .get_bot_by_username(&username)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state
        .db
        .delete_block(&bot.id.to_string(), &target.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}
