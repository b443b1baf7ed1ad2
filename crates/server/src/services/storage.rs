// Attachment file storage on the local disk.

use std::path::{Component, Path, PathBuf};

use tokio::fs;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    services::tags::slugify,
};

#[derive(Clone, Debug)]
pub struct StorageService {
    base_path: PathBuf,
}

impl StorageService {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create storage directory: {e}")))?;
        Ok(())
    }

    /// Resolves a stored relative path under the storage root.
    pub fn absolute(&self, stored_path: &str) -> Result<PathBuf> {
        let relative = Path::new(stored_path);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(AppError::Internal(format!(
                "Refusing to touch path outside storage: {stored_path}"
            )));
        }
        Ok(self.base_path.join(relative))
    }

    /// Writes `bytes` under `dir` with a collision-free name derived from
    /// `original_name`. Returns the path relative to the storage root.
    pub async fn store(&self, dir: &str, original_name: &str, bytes: &[u8]) -> Result<String> {
        let stored_path = format!("{dir}/{}", stored_file_name(original_name));
        let path = self.absolute(&stored_path)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create directories: {e}")))?;
        }

        fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write file: {e}")))?;

        Ok(stored_path)
    }

    /// Removes a stored file. A file that is already gone is not an error.
    pub async fn delete(&self, stored_path: &str) -> Result<bool> {
        let path = self.absolute(stored_path)?;

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %stored_path, "stored file already absent");
                Ok(false)
            }
            Err(e) => Err(AppError::Internal(format!("Failed to delete file: {e}"))),
        }
    }
}

fn stored_file_name(original_name: &str) -> String {
    let original = Path::new(original_name);
    let stem = original
        .file_stem()
        .and_then(|s| s.to_str())
        .map(slugify)
        .unwrap_or_default();
    let extension = original
        .extension()
        .and_then(|s| s.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()));

    let id = Uuid::new_v4();
    match extension {
        Some(ext) => format!("{id}_{stem}.{ext}"),
        None => format!("{id}_{stem}"),
    }
}
