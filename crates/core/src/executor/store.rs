//! Local file system artifact store.

use async_trait::async_trait;
use std::path::Path;
use tokio::fs;
use tracing::debug;

use super::config::StorageConfig;
use super::error::ExecutorError;
use super::traits::ArtifactStore;

/// Publishes artifacts by placing them under a served directory.
pub struct LocalArtifactStore {
    config: StorageConfig,
}

impl LocalArtifactStore {
    pub fn new(config: StorageConfig) -> Self {
        Self { config }
    }

    /// Attempts to move a file atomically (rename).
    ///
    /// Returns false when source and destination are on different devices.
    async fn try_atomic_move(source: &Path, destination: &Path) -> Result<bool, std::io::Error> {
        match fs::rename(source, destination).await {
            Ok(()) => Ok(true),
            Err(e) => {
                if e.kind() == std::io::ErrorKind::CrossesDevices || e.raw_os_error() == Some(18) {
                    Ok(false)
                } else {
                    Err(e)
                }
            }
        }
    }

    fn public_url(&self, job_id: &str, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.public_base_url.trim_end_matches('/'),
            job_id,
            file_name
        )
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, job_id: &str, path: &Path) -> Result<String, ExecutorError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| {
                ExecutorError::stage_failed("upload", format!("not a file: {}", path.display()))
            })?;

        let dest_dir = self.config.output_dir.join(job_id);
        fs::create_dir_all(&dest_dir).await?;
        let destination = dest_dir.join(&file_name);

        if !Self::try_atomic_move(path, &destination).await? {
            fs::copy(path, &destination).await?;
            fs::remove_file(path).await?;
        }

        debug!("Placed artifact {}", destination.display());
        Ok(self.public_url(job_id, &file_name))
    }
}
