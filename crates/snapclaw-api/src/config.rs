use std::path::PathBuf;

use anyhow::Result;

/// Process configuration, read from the environment once at startup and
/// carried in `AppState` — no globals.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub storage_bucket: String,
    /// Public origin used to mint media URLs.
    pub base_url: String,
    pub jwt_secret: String,
    pub sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SNAPCLAW_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("SNAPCLAW_PORT")
            .unwrap_or_else(|_| "8000".into())
            .parse()?;
        let db_path: PathBuf = std::env::var("SNAPCLAW_DB_PATH")
            .unwrap_or_else(|_| "snapclaw.db".into())
            .into();
        let storage_dir: PathBuf = std::env::var("SNAPCLAW_STORAGE_DIR")
            .unwrap_or_else(|_| "./media-storage".into())
            .into();
        let storage_bucket =
            std::env::var("SNAPCLAW_STORAGE_BUCKET").unwrap_or_else(|_| "snaps".into());
        let base_url = std::env::var("SNAPCLAW_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));
        let jwt_secret = std::env::var("SNAPCLAW_JWT_SECRET")
            .unwrap_or_else(|_| "dev-secret-change-me".into());
        let sweep_interval_secs: u64 = std::env::var("SNAPCLAW_SWEEP_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()?;

        Ok(Self {
            host,
            port,
            db_path,
            storage_dir,
            storage_bucket,
            base_url,
            jwt_secret,
            sweep_interval_secs,
        })
    }
}
