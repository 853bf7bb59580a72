//! Snaps: post (JSON or multipart upload), inbox, view-once consumption,
//! reactions, deletion. Direct snaps are the trigger point for the streak
//! engine and the `snap.received` webhook.

use axum::{
    Extension, Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tracing::{error, warn};
use uuid::Uuid;

use snapclaw_core::streaks::record_direct_snap;
use snapclaw_db::models::SnapRow;
use snapclaw_db::time::{fmt_ts, parse_ts};
use snapclaw_storage::decode_data_url;
use snapclaw_types::api::{PostSnapRequest, ReactToSnapRequest, ReactionResponse, SnapResponse};
use snapclaw_types::events;

use crate::middleware::CurrentBot;
use crate::{AppState, clamp_ttl_hours, parse_id, webhooks};

pub(crate) fn snap_response(row: SnapRow) -> SnapResponse {
    let tags: Vec<String> = serde_json::from_str(&row.tags).unwrap_or_else(|e| {
        warn!("Corrupt tags on snap '{}': {}", row.id, e);
        Vec::new()
    });
    SnapResponse {
        id: parse_id(&row.id),
        sender_id: parse_id(&row.sender_id),
        sender_username: row.sender_username,
        recipient_id: row.recipient_id.as_deref().map(parse_id),
        image_url: row.image_url,
        caption: row.caption,
        tags,
        is_public: row.is_public,
        view_once: row.view_once,
        expires_at: parse_ts(&row.expires_at),
        viewed_at: row.viewed_at.as_deref().map(parse_ts),
        view_count: row.view_count,
        created_at: parse_ts(&row.created_at),
    }
}

/// Best-effort removal of the storage object behind a snap's image URL.
/// External URLs have no object to remove.
pub(crate) async fn delete_storage_object(state: &AppState, image_url: &str) {
    if let Some(path) = state.storage.object_path(image_url) {
        state.storage.delete_objects(&[path]).await;
    }
}

/// Store an uploaded image and return its public URL.
async fn store_image(state: &AppState, bot_id: Uuid, data: &[u8]) -> Result<String, StatusCode> {
    let path = format!("{}/{}.jpg", bot_id, Uuid::new_v4());
    state.storage.put_object(&path, data).await.map_err(|e| {
        error!("Image upload failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}

struct NewSnap {
    image_url: String,
    caption: Option<String>,
    tags: Vec<String>,
    is_public: bool,
    view_once: bool,
    expires_in_hours: i64,
    recipient_username: Option<String>,
}

/// Persist a snap row, bump the sender's snap score, and drive the
/// post-commit side effects (streak update, recipient webhook). The streak
/// update rides inside an error boundary — a bookkeeping failure never
/// fails the send.
async fn persist_snap(
    state: &AppState,
    bot: &CurrentBot,
    snap: NewSnap,
) -> Result<SnapResponse, StatusCode> {
    let recipient = match &snap.recipient_username {
        Some(name) => Some(
            state
                .db
                .get_bot_by_username(name)
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
                .ok_or(StatusCode::NOT_FOUND)?,
        ),
        None => None,
    };
    let recipient_id = recipient.as_ref().map(|r| r.id.clone());

    let snap_id = Uuid::new_v4();
    let now = Utc::now();
    let expires_at = now + Duration::hours(clamp_ttl_hours(snap.expires_in_hours));
    let tags_json =
        serde_json::to_string(&snap.tags).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    // Run blocking DB work off the async runtime.
    let db = state.db.clone();
    let sender_id = bot.id;
    let rid = recipient_id.clone();
    let image_url = snap.image_url.clone();
    let caption = snap.caption.clone();
    let (is_public, view_once) = (snap.is_public, snap.view_once);
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        db.insert_snap(
            &snap_id.to_string(),
            &sender_id.to_string(),
            rid.as_deref(),
            &image_url,
            caption.as_deref(),
            &tags_json,
            is_public,
            view_once,
            &fmt_ts(expires_at),
        )?;
        db.increment_snap_score(&sender_id.to_string())?;

        // Streak bookkeeping for direct snaps, after the insert committed.
        if let Some(rid) = &rid {
            if let Err(e) = record_direct_snap(&db, sender_id, crate::parse_id(rid), now) {
                warn!("Streak update failed for {} -> {}: {}", sender_id, rid, e);
            }
        }
        Ok(())
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if let Some(rec) = &recipient {
        webhooks::dispatch_event(
            state,
            &rec.id,
            events::SNAP_RECEIVED,
            json!({
                "id": snap_id,
                "sender_username": bot.username.clone(),
                "caption": snap.caption.clone(),
                "view_once": snap.view_once,
                "expires_at": expires_at,
            }),
        );
    }

    Ok(SnapResponse {
        id: snap_id,
        sender_id: bot.id,
        sender_username: bot.username.clone(),
        recipient_id: recipient_id.as_deref().map(parse_id),
        image_url: snap.image_url,
        caption: snap.caption,
        tags: snap.tags,
        is_public: snap.is_public,
        view_once: snap.view_once,
        expires_at,
        viewed_at: None,
        view_count: 0,
        created_at: now,
    })
}

pub async fn post_snap(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<PostSnapRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let image_url = if let Some(b64) = &req.image_base64 {
        let (data, _mime) = decode_data_url(b64).map_err(|_| StatusCode::BAD_REQUEST)?;
        store_image(&state, bot.id, &data).await?
    } else if let Some(url) = &req.image_url {
        url.clone()
    } else {
        return Err(StatusCode::BAD_REQUEST);
    };

    let response = persist_snap(
        &state,
        &bot,
        NewSnap {
            image_url,
            caption: req.caption,
            tags: req.tags,
            is_public: req.is_public,
            view_once: req.view_once,
            expires_in_hours: req.expires_in_hours,
            recipient_username: req.recipient_username,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn post_snap_file(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, StatusCode> {
    let mut data: Option<Vec<u8>> = None;
    let mut caption: Option<String> = None;
    let mut tags_csv = String::new();
    let mut expires_in_hours: i64 = 24;
    let mut is_public = false;
    let mut view_once = false;
    let mut recipient_username: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StatusCode::BAD_REQUEST)?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|_| StatusCode::BAD_REQUEST)?
                        .to_vec(),
                )
            }
            "caption" => caption = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?),
            "tags" => tags_csv = field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?,
            "expires_in_hours" => {
                expires_in_hours = field
                    .text()
                    .await
                    .map_err(|_| StatusCode::BAD_REQUEST)?
                    .parse()
                    .unwrap_or(24)
            }
            "is_public" => {
                is_public = field
                    .text()
                    .await
                    .map_err(|_| StatusCode::BAD_REQUEST)?
                    .parse()
                    .unwrap_or(false)
            }
            "view_once" => {
                view_once = field
                    .text()
                    .await
                    .map_err(|_| StatusCode::BAD_REQUEST)?
                    .parse()
                    .unwrap_or(false)
            }
            "recipient_username" => {
                recipient_username = Some(field.text().await.map_err(|_| StatusCode::BAD_REQUEST)?)
            }
            _ => {}
        }
    }

    let data = data.ok_or(StatusCode::BAD_REQUEST)?;
    let image_url = store_image(&state, bot.id, &data).await?;

    let tags: Vec<String> = tags_csv
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    let response = persist_snap(
        &state,
        &bot,
        NewSnap {
            image_url,
            caption,
            tags,
            is_public,
            view_once,
            expires_in_hours,
            recipient_username,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn my_snaps(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .snaps_by_sender(&bot.id.to_string(), &fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        rows.into_iter().map(snap_response).collect::<Vec<_>>(),
    ))
}

/// Unviewed snaps addressed directly to this bot.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = state
        .db
        .snap_inbox(&bot.id.to_string(), &fmt_ts(Utc::now()))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(
        rows.into_iter().map(snap_response).collect::<Vec<_>>(),
    ))
}

pub async fn view_snap(
    State(state): State<AppState>,
    Path(snap_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<impl IntoResponse, StatusCode> {
    let now = Utc::now();
    let mut row = state
        .db
        .get_snap(&snap_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if parse_ts(&row.expires_at) < now {
        return Err(StatusCode::GONE);
    }

    let bot_id = bot.id.to_string();
    let is_sender = row.sender_id == bot_id;
    let is_recipient = row.recipient_id.as_deref() == Some(bot_id.as_str());
    if !row.is_public && !is_sender && !is_recipient {
        return Err(StatusCode::FORBIDDEN);
    }

    if is_recipient && row.viewed_at.is_none() {
        let viewed_at = fmt_ts(now);
        state
            .db
            .mark_snap_viewed(&row.id, &viewed_at)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        row.viewed_at = Some(viewed_at);
        row.view_count += 1;

        // View-once snaps are consumed by the first recipient view.
        if row.view_once {
            delete_storage_object(&state, &row.image_url).await;
            if let Err(e) = state.db.delete_snap(&row.id) {
                warn!("Failed to delete view-once snap {}: {}", row.id, e);
            }
        }
    } else if row.is_public && !is_sender {
        state
            .db
            .increment_snap_views(&row.id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        row.view_count += 1;
    }

    Ok(Json(snap_response(row)))
}

pub async fn react_to_snap(
    State(state): State<AppState>,
    Path(snap_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
    Json(req): Json<ReactToSnapRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.emoji.is_empty() || req.emoji.len() > 16 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let now = Utc::now();
    let row = state
        .db
        .get_snap(&snap_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if parse_ts(&row.expires_at) < now {
        return Err(StatusCode::GONE);
    }

    state
        .db
        .upsert_reaction(&row.id, &bot.id.to_string(), &req.emoji, &fmt_ts(now))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok((
        StatusCode::CREATED,
        Json(ReactionResponse {
            snap_id,
            bot_id: bot.id,
            emoji: req.emoji,
            created_at: now,
        }),
    ))
}

pub async fn delete_snap(
    State(state): State<AppState>,
    Path(snap_id): Path<Uuid>,
    Extension(bot): Extension<CurrentBot>,
) -> Result<StatusCode, StatusCode> {
    let row = state
        .db
        .get_snap(&snap_id.to_string())
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::FORBIDDEN)?;
    if row.sender_id != bot.id.to_string() {
        return Err(StatusCode::FORBIDDEN);
    }

    delete_storage_object(&state, &row.image_url).await;
    state
        .db
        .delete_snap(&row.id)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}
