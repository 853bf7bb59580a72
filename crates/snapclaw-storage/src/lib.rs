use anyhow::{Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn};

/// On-disk media store.
///
/// Objects live at `{root}/{bucket}/{path}` and are served over HTTP under
/// `{base_url}/media/{bucket}/{path}`. Snap rows store the full public URL;
/// `object_path` recovers the storage path from such a URL, and returns
/// `None` for externally-hosted images that were stored as-is.
pub struct Storage {
    root: PathBuf,
    bucket: String,
    base_url: String,
}

impl Storage {
    pub async fn new(root: PathBuf, bucket: &str, base_url: &str) -> Result<Self> {
        fs::create_dir_all(root.join(bucket)).await?;
        info!("Media storage directory: {}", root.display());
        Ok(Self {
            root,
            bucket: bucket.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Directory handed to the HTTP layer for static serving under `/media`.
    pub fn serve_root(&self) -> &PathBuf {
        &self.root
    }

    fn marker(&self) -> String {
        format!("/media/{}/", self.bucket)
    }

    pub fn public_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.marker(), path)
    }

    /// Extract the storage path out of a stored URL. `None` means the URL
    /// does not point into this store (external image — nothing to delete).
    pub fn object_path(&self, url: &str) -> Option<String> {
        let marker = self.marker();
        let idx = url.find(&marker)?;
        let path = &url[idx + marker.len()..];
        // Never let a stored URL walk out of the bucket directory.
        if path.is_empty() || path.split('/').any(|seg| seg == "..") {
            return None;
        }
        Some(path.to_string())
    }

    /// Write an object and return its public URL.
    pub async fn put_object(&self, path: &str, data: &[u8]) -> Result<String> {
        let full = self.root.join(&self.bucket).join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&full, data).await?;
        Ok(self.public_url(path))
    }

    /// Best-effort batch delete. Returns how many objects were removed;
    /// individual failures are logged and skipped.
    pub async fn delete_objects(&self, paths: &[String]) -> usize {
        let mut deleted = 0;
        for path in paths {
            let full = self.root.join(&self.bucket).join(path);
            match fs::remove_file(&full).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!("Storage object {} already gone", path);
                }
                Err(e) => {
                    warn!("Failed to delete storage object {}: {}", path, e);
                }
            }
        }
        deleted
    }
}

/// Decode a `data:<mime>;base64,<payload>` URL, or raw base64 (assumed JPEG).
pub fn decode_data_url(input: &str) -> Result<(Vec<u8>, String)> {
    if let Some(rest) = input.strip_prefix("data:") {
        let Some((header, payload)) = rest.split_once(',') else {
            bail!("data URL missing ',' separator");
        };
        let mime = header
            .split(';')
            .next()
            .filter(|m| !m.is_empty())
            .unwrap_or("application/octet-stream");
        let bytes = B64.decode(payload.trim())?;
        Ok((bytes, mime.to_string()))
    } else {
        let bytes = B64.decode(input.trim())?;
        Ok((bytes, "image/jpeg".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_storage() -> Storage {
        let root = std::env::temp_dir().join(format!("snapclaw-storage-{}", std::process::id()));
        Storage::new(root, "snaps", "http://localhost:8000")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn url_round_trip() {
        let storage = test_storage().await;
        let url = storage.public_url("bot-1/abc.jpg");
        assert_eq!(url, "http://localhost:8000/media/snaps/bot-1/abc.jpg");
        assert_eq!(storage.object_path(&url).unwrap(), "bot-1/abc.jpg");
    }

    #[tokio::test]
    async fn external_urls_have_no_object_path() {
        let storage = test_storage().await;
        assert!(storage.object_path("https://example.com/cat.png").is_none());
        assert!(storage.object_path("http://localhost:8000/media/other/x.jpg").is_none());
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let storage = test_storage().await;
        let url = "http://localhost:8000/media/snaps/../secrets.txt";
        assert!(storage.object_path(url).is_none());
    }

    #[tokio::test]
    async fn put_then_delete() {
        let storage = test_storage().await;
        let url = storage.put_object("t/one.jpg", b"jpeg bytes").await.unwrap();
        let path = storage.object_path(&url).unwrap();
        assert_eq!(storage.delete_objects(&[path.clone()]).await, 1);
        // Second delete finds nothing.
        assert_eq!(storage.delete_objects(&[path]).await, 0);
    }

    #[test]
    fn decodes_data_urls() {
        let (bytes, mime) = decode_data_url("data:image/png;base64,aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime, "image/png");

        let (bytes, mime) = decode_data_url("aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(mime, "image/jpeg");

        assert!(decode_data_url("data:image/png;base64").is_err());
    }
}
