use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use uuid::Uuid;

use snapclaw_types::api::Claims;

use crate::{AppState, auth, parse_id};

/// The bot resolved from an `X-API-Key` header, available to handlers as an
/// extension.
#[derive(Debug, Clone)]
pub struct CurrentBot {
    pub id: Uuid,
    pub username: String,
}

pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolve and validate the API key, attaching `CurrentBot` to the request.
pub async fn require_bot(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let raw_key = req
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let key_hash = auth::hash_api_key(raw_key);
    let (bot_id, revoked_at) = state
        .db
        .lookup_api_key(&key_hash)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if revoked_at.is_some() {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let bot = state
        .db
        .get_bot_by_id(&bot_id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(CurrentBot {
        id: parse_id(&bot.id),
        username: bot.username,
    });
    Ok(next.run(req).await)
}

/// Extract and validate a human-owner JWT from the Authorization header.
pub async fn require_human(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| StatusCode::UNAUTHORIZED)?;

    req.extensions_mut().insert(token_data.claims);
    Ok(next.run(req).await)
}
