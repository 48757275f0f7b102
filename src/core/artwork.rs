use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::error::AppError;

/// Upload extensions accepted for the exchange: images and short videos.
pub const ALLOWED_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "gif", "webp", "mp4", "webm", "mov"];

/// Upload ceiling, enforced on the actual payload rather than any declared
/// length.
pub const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// A stored artwork submission. At most one record exists per submitter;
/// re-uploads replace the file and update this record in place.
#[derive(PartialEq, Eq, Debug, FromRow, Clone, Serialize, Deserialize)]
pub struct Artwork {
    /// Submitter's snowflake
    pub created_by: String,

    /// Where the file landed under the artwork root
    pub image_path: String,

    /// Unix seconds
    pub created_at: i64,
}

/// Blob store for submitted artwork, rooted at a configured directory.
pub struct ArtworkStore {
    root: PathBuf,
}

impl ArtworkStore {
    pub fn new(root: PathBuf) -> Self {
        ArtworkStore { root }
    }

    pub async fn ensure_root(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("failed to create artwork dir {}", self.root.display()))?;
        Ok(())
    }

    /// Validates an upload's file name and payload size, returning the
    /// normalized extension to store under.
    pub fn validate_upload(filename: &str, size: usize) -> Result<String, AppError> {
        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .ok_or_else(|| {
                AppError::Validation(format!("File '{}' has no extension", filename))
            })?;

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(AppError::Validation(format!(
                "File type '{}' is not allowed",
                extension
            )));
        }

        if size == 0 {
            return Err(AppError::Validation("Uploaded file is empty".to_owned()));
        }

        if size > MAX_UPLOAD_BYTES {
            return Err(AppError::Validation(format!(
                "Uploaded file exceeds the {} MiB limit",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        Ok(extension)
    }

    /// Destination for a submitter's file. One slot per submitter; the
    /// extension varies with the upload.
    pub fn path_for(&self, snowflake: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}.{}", snowflake, extension))
    }

    pub async fn write(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
        tokio::fs::write(path, bytes)
            .await
            .with_context(|| format!("failed to write artwork file {}", path.display()))?;
        Ok(())
    }

    pub async fn read(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read artwork file {}", path))?;
        Ok(bytes)
    }

    /// Removes a previously stored file. A file that is already gone is not
    /// an error.
    pub async fn delete(&self, path: &str) -> anyhow::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete artwork file {}", path)),
        }
    }

    pub fn content_type(path: &str) -> &'static str {
        match Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .as_deref()
        {
            Some("png") => "image/png",
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            Some("webp") => "image/webp",
            Some("mp4") => "video/mp4",
            Some("webm") => "video/webm",
            Some("mov") => "video/quicktime",
            _ => "application/octet-stream",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disallowed_extension_rejected() {
        let err = ArtworkStore::validate_upload("totally_art.exe", 1024).unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = ArtworkStore::validate_upload("no_extension", 1024).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_allowed_extension_normalized() {
        let ext = ArtworkStore::validate_upload("piece.PNG", 1024).unwrap();
        assert_eq!(ext, "png");

        let ext = ArtworkStore::validate_upload("clip.webm", 1024).unwrap();
        assert_eq!(ext, "webm");
    }

    #[test]
    fn test_size_ceiling() {
        assert!(ArtworkStore::validate_upload("piece.png", MAX_UPLOAD_BYTES).is_ok());

        let err = ArtworkStore::validate_upload("piece.png", MAX_UPLOAD_BYTES + 1).unwrap_err();
        assert_eq!(err.kind(), "validation");

        let err = ArtworkStore::validate_upload("piece.png", 0).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn test_content_types() {
        assert_eq!(ArtworkStore::content_type("art/1.png"), "image/png");
        assert_eq!(ArtworkStore::content_type("art/1.mov"), "video/quicktime");
        assert_eq!(
            ArtworkStore::content_type("art/strange"),
            "application/octet-stream"
        );
    }
}
