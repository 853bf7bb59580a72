//! Webhook registration and delivery. Bots register a URL; the server POSTs
//! a JSON envelope whenever a subscribed event occurs. Delivery is spawned
//! per endpoint and best-effort: errors are logged, never retried.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

use snapclaw_db::models::WebhookRow;
use snapclaw_db::time::parse_ts;
use snapclaw_types::api::{RegisterWebhookRequest, WebhookResponse};
use snapclaw_types::events::WebhookEnvelope;

use crate::middleware::CurrentBot;
use crate::{AppState, parse_id};

const DELIVERY_TIMEOUT_SECS: u64 = 10;
const SIGNATURE_HEADER: &str = "X-SnapClaw-Signature";

fn webhook_response(row: WebhookRow) -> WebhookResponse {
    let events: Vec<String> = serde_json::from_str(&row.events).unwrap_or_else(|e| {
        warn!("Corrupt events on webhook '{}': {}", row.id, e);
        Vec::new()
    });
    WebhookResponse {
        id: parse_id(&row.id),
        url: row.url,
        events,
        secret: row.secret,
        created_at: parse_ts(&row.created_at),
    }
}

// -- Delivery --

/// Look up registered endpoints for this bot + event and spawn a delivery
/// per match. Never fails the caller.
pub fn dispatch_event(state: &AppState, bot_id: &str, event: &str, data: serde_json::Value) {
    let rows = match state.db.webhooks_for_bot(bot_id) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Webhook lookup failed for bot {}: {}", bot_id, e);
            return;
        }
    };

    let bot_uuid = parse_id(bot_id);
    for row in rows {
        let events: Vec<String> = serde_json::from_str(&row.events).unwrap_or_default();
        if !events.iter().any(|name| name == event) {
            continue;
        }
        let envelope = WebhookEnvelope::new(event, bot_uuid, data.clone());
        tokio::spawn(deliver(state.http.clone(), row.url, row.secret, envelope));
    }
}

async fn deliver(
    http: reqwest::Client,
    url: String,
    secret: Option<String>,
    envelope: WebhookEnvelope,
) {
    let body = match serde_json::to_vec(&envelope) {
        Ok(body) => body,
        Err(e) => {
            warn!("Webhook payload serialization failed: {}", e);
            return;
        }
    };

    let mut request = http
        .post(&url)
        .timeout(std::time::Duration::from_secs(DELIVERY_TIMEOUT_SECS))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .header(reqwest::header::USER_AGENT, "SnapClaw/1.0");

    if let Some(secret) = secret {
        match Hmac::<Sha256>::new_from_slice(secret.as_bytes()) {
            Ok(mut mac) => {
                mac.update(&body);
                let sig = hex::encode(mac.finalize().into_bytes());
                request = request.header(SIGNATURE_HEADER, format!("sha256={}", sig));
            }
            Err(e) => {
                warn!("Webhook signing failed for {}: {}", url, e);
                return;
            }
        }
    }

    match request.body(body).send().await {
        Ok(response) => info!("Webhook → {} : {}", url, response.status()),
        Err(e) => warn!("Webhook delivery failed to {}: {}", url, e),
    }
}

// -- Endpoints --

/// Register (or update) a webhook URL for this bot. One row per URL per bot.
pub async fn register_webhook(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<RegisterWebhookRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
        return Err(StatusCode::BAD_REQUEST);
    }

    let events_json =
        serde_json::to_string(&req.events).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let row = state
        .db
        .upsert_webhook(
            &Uuid::new_v4().to_string(),
            &bot.id.to_string(),
            &req.url,
            req.secret.as_deref(),
            &events_json,
        )
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((StatusCode::CREATED, Json(webhook_response(row))))
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .webhooks_for_bot(&bot.id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        rows.into_iter().map(webhook_response).collect::<Vec<_>>(),
    ))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Path(webhook_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<StatusCode, StatusCode> {
    let row = state
        .db
        .get_webhook(&webhook_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if row.bot_id != bot.id.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    state
        .db
        .delete_webhook(&row.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}
