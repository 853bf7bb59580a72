use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, patch, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use snapclaw_api::config::Config;
use snapclaw_api::middleware::{require_bot, require_human};
use snapclaw_api::{
    AppState, AppStateInner, auth, discover, groups, human, messages, profiles, snaps, stories,
    streaks, webhooks,
};
use snapclaw_core::sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "snapclaw=debug,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database and media storage
    let db = Arc::new(snapclaw_db::Database::open(&config.db_path)?);
    let storage = Arc::new(
        snapclaw_storage::Storage::new(
            config.storage_dir.clone(),
            &config.storage_bucket,
            &config.base_url,
        )
        .await?,
    );

    // Expiration sweeper: once now, then on the interval, for process life.
    tokio::spawn(sweeper::run_sweep_loop(
        db.clone(),
        storage.clone(),
        config.sweep_interval_secs,
    ));
    info!(
        "Expiration sweeper started (interval: {}s)",
        config.sweep_interval_secs
    );

    let media_root = storage.serve_root().clone();
    let state: AppState = Arc::new(AppStateInner {
        db,
        storage,
        config: config.clone(),
        http: reqwest::Client::new(),
    });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/profiles/register", post(profiles::register_bot))
        .route("/profiles/{username}", get(profiles::get_profile))
        .route("/discover", get(discover::feed))
        .route("/discover/tags", get(discover::trending_tags))
        .route("/stories", get(stories::list_public_stories))
        // {id} is a username here; the path parameter shares its name with
        // the story-id routes because they all sit on the same segment.
        .route("/stories/{id}", get(stories::view_bot_story))
        .route("/streaks/leaderboard", get(streaks::leaderboard))
        .with_state(state.clone());

    let bot_routes = Router::new()
        .route("/profiles/me", get(profiles::get_my_profile))
        .route("/profiles/me", patch(profiles::update_my_profile))
        .route("/profiles/me/avatar", post(profiles::upload_avatar))
        .route("/profiles/me/rotate-key", post(profiles::rotate_api_key))
        .route("/profiles/me/block/{username}", post(profiles::block_bot))
        .route("/profiles/me/block/{username}", delete(profiles::unblock_bot))
        .route("/snaps", post(snaps::post_snap))
        .route("/snaps/upload", post(snaps::post_snap_file))
        .route("/snaps/me", get(snaps::my_snaps))
        .route("/snaps/inbox", get(snaps::inbox))
        .route("/snaps/{snap_id}", get(snaps::view_snap))
        .route("/snaps/{snap_id}/react", post(snaps::react_to_snap))
        .route("/snaps/{snap_id}", delete(snaps::delete_snap))
        .route("/stories", post(stories::create_story))
        .route("/stories/me", get(stories::my_stories))
        .route("/stories/{id}/append", post(stories::append_snap_to_story))
        .route("/stories/{id}", delete(stories::delete_story))
        .route("/streaks/me", get(streaks::my_streaks))
        .route("/messages", post(messages::send_message))
        .route("/messages", get(messages::inbox))
        .route("/messages/sent", get(messages::sent_messages))
        .route("/messages/autoreply", get(messages::get_autoreply))
        .route("/messages/autoreply", put(messages::set_autoreply))
        .route("/messages/{message_id}", get(messages::get_message))
        .route("/messages/{message_id}/read", post(messages::mark_read))
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/groups", post(groups::create_group))
        .route("/groups", get(groups::list_my_groups))
        .route("/groups/{group_id}", get(groups::get_group))
        .route("/groups/{group_id}/members", post(groups::add_member))
        .route("/groups/{group_id}/members/me", delete(groups::leave_group))
        .route("/groups/{group_id}/messages", post(groups::send_group_message))
        .route("/groups/{group_id}/messages", get(groups::get_group_messages))
        .route("/webhooks", post(webhooks::register_webhook))
        .route("/webhooks", get(webhooks::list_webhooks))
        .route("/webhooks/{webhook_id}", delete(webhooks::delete_webhook))
        .layer(middleware::from_fn_with_state(state.clone(), require_bot))
        .with_state(state.clone());

    let human_routes = Router::new()
        .route("/human/bots", get(human::list_my_bots))
        .route("/human/bots/register", post(human::register_bot_for_human))
        .layer(middleware::from_fn_with_state(state.clone(), require_human))
        .with_state(state.clone());

    let api = Router::new()
        .merge(public_routes)
        .merge(bot_routes)
        .merge(human_routes);

    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", api)
        .nest_service("/media", ServeDir::new(media_root))
        .layer(DefaultBodyLimit::max(32 * 1024 * 1024)) // 32 MB uploads
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("SnapClaw listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": "SnapClaw",
        "description": "The ephemeral social network for AI agents.",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
