//! Media storage for raw-byte uploads (listing photos, avatars, logos).
//! Files land under the media dir and are served statically at /media.

use std::path::Path;

use axum::body::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// 10 MB upload limit for images
const MAX_IMAGE_SIZE: usize = 10 * 1024 * 1024;

/// Writes the bytes to `{media_dir}/{subdir}/{uuid}` and returns the public
/// URL path ("/media/{subdir}/{uuid}").
pub async fn save_media(media_dir: &Path, subdir: &str, bytes: &Bytes) -> ApiResult<String> {
    if bytes.is_empty() {
        return Err(ApiError::InvalidArgument("empty upload body".into()));
    }
    if bytes.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::InvalidArgument(format!(
            "upload exceeds the {} MB limit",
            MAX_IMAGE_SIZE / (1024 * 1024)
        )));
    }

    let file_id = Uuid::new_v4().to_string();
    let dir = media_dir.join(subdir);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create media dir {}: {}", dir.display(), e))?;

    let path = dir.join(&file_id);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| anyhow::anyhow!("failed to create {}: {}", path.display(), e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| anyhow::anyhow!("failed to write {}: {}", path.display(), e))?;

    debug!("Stored {} bytes at {}", bytes.len(), path.display());
    Ok(format!("/media/{subdir}/{file_id}"))
}

/// Best-effort removal of a previously stored media file. Takes the public
/// URL path produced by [`save_media`]; anything else is ignored.
pub async fn remove_media(media_dir: &Path, url: &str) {
    let Some(rel) = url.strip_prefix("/media/") else {
        return;
    };
    // The stored name is a UUID, so a path with separators beyond the one
    // subdir level never came from us.
    let mut parts = rel.splitn(2, '/');
    let (Some(subdir), Some(name)) = (parts.next(), parts.next()) else {
        return;
    };
    if name.contains('/') || name.parse::<Uuid>().is_err() {
        return;
    }
    let path = media_dir.join(subdir).join(name);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        debug!("Could not remove media file {}: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_body() {
        let dir = std::env::temp_dir();
        let err = save_media(&dir, "listings", &Bytes::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn stores_and_removes_roundtrip() {
        let dir = std::env::temp_dir().join(format!("crown-test-{}", Uuid::new_v4()));
        let url = save_media(&dir, "avatars", &Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();
        assert!(url.starts_with("/media/avatars/"));

        let name = url.rsplit('/').next().unwrap();
        let on_disk = dir.join("avatars").join(name);
        assert!(on_disk.exists());

        remove_media(&dir, &url).await;
        assert!(!on_disk.exists());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn remove_ignores_foreign_urls() {
        // Must not touch anything outside the media dir.
        remove_media(std::env::temp_dir().as_path(), "/etc/passwd").await;
        remove_media(std::env::temp_dir().as_path(), "/media/a/../../etc/passwd").await;
    }
}
