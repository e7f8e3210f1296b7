//! Output file writing

use std::path::Path;

use tokio::fs;
use tracing::{debug, error, info};

use crate::error::{Result, TorrentError};

/// Write downloaded bytes to `path`, creating parent directories as needed
pub async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            debug!("Creating directory: {}", parent.display());
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create directory '{}': {}", parent.display(), e);
                TorrentError::storage_error_full(
                    "Failed to create directory",
                    parent.display().to_string(),
                    e.to_string(),
                )
            })?;
        }
    }

    fs::write(path, data).await.map_err(|e| {
        error!("Failed to write '{}': {}", path.display(), e);
        TorrentError::storage_error_full("Failed to write output file", path.display().to_string(), e.to_string())
    })?;

    info!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}
