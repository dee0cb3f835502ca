//! JSON file persistence shared by the vote ledger and the id allocator
//!
//! Writes are full overwrites that go through a sibling temp file and a
//! rename, so a reader never observes a half-written document.

use crate::error::AppError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Read a JSON document, or `None` if the file does not exist yet
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, AppError> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes).map_err(|e| {
                AppError::Persistence(format!("{} is not valid: {}", path.display(), e))
            })?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::Persistence(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}

/// Replace the file at `path` with the pretty-printed JSON of `value`
pub async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), AppError> {
    let body = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let tmp = temp_path(path);
    fs::write(&tmp, &body).await.map_err(|e| {
        AppError::Persistence(format!("Failed to write {}: {}", tmp.display(), e))
    })?;
    fs::rename(&tmp, path).await.map_err(|e| {
        AppError::Persistence(format!("Failed to replace {}: {}", path.display(), e))
    })?;

    debug!(path = %path.display(), bytes = body.len(), "persisted snapshot");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
