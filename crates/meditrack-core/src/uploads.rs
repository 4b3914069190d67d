//! Report file storage
//!
//! Files are written under the configured upload directory with a generated
//! name, and served back read-only from the public `/uploads` path. The stored
//! extension always comes from the accepted content type, never from the
//! client's file name, so the served MIME type matches what was validated.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::UploadConfig;

/// Upload errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Unsupported file type '{0}': expected a PNG, JPEG, GIF, WebP or BMP image, or a PDF")]
    UnsupportedType(String),

    #[error("Uploaded file is empty")]
    Empty,

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),
}

/// Local-disk upload storage
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
    public_path: String,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        Self {
            dir: config.dir.clone(),
            public_path: config.public_path.trim_end_matches('/').to_string(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn public_path(&self) -> &str {
        &self.public_path
    }

    /// Create the upload directory if needed
    pub async fn ensure_dir(&self) -> Result<(), UploadError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// Store a file and return its public URL
    pub async fn save(
        &self,
        file_name: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<String, UploadError> {
        let content_type = content_type.unwrap_or("application/octet-stream");
        let extension = extension_for(content_type)
            .ok_or_else(|| UploadError::UnsupportedType(content_type.to_string()))?;
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }

        let stored_name = format!("{}.{extension}", Uuid::new_v4());

        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&stored_name), bytes).await?;

        tracing::debug!(
            file = %stored_name,
            original = file_name.unwrap_or_default(),
            size = bytes.len(),
            "Stored upload"
        );
        Ok(format!("{}/{stored_name}", self.public_path))
    }

    /// Whether `url` names a file inside this store
    pub fn is_stored(&self, url: &str) -> bool {
        self.stored_name(url).is_some()
    }

    /// Delete the file behind a stored URL.
    ///
    /// Returns `false` for URLs outside the store and for files already gone.
    pub async fn remove(&self, url: &str) -> Result<bool, UploadError> {
        let Some(name) = self.stored_name(url) else {
            return Ok(false);
        };

        match tokio::fs::remove_file(self.dir.join(name)).await {
            Ok(()) => {
                tracing::debug!(file = %name, "Removed upload");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// File name under the upload directory; a single path segment only
    fn stored_name<'a>(&self, url: &'a str) -> Option<&'a str> {
        let name = url.strip_prefix(self.public_path.as_str())?.strip_prefix('/')?;
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        valid.then_some(name)
    }
}

/// Stored extension for an accepted content type
fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match essence.as_str() {
        "application/pdf" => Some("pdf"),
        "image/png" => Some("png"),
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/bmp" => Some("bmp"),
        _ => None,
    }
}
