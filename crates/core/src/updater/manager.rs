//! Binary update manager.
//!
//! Replaces the managed executable with the latest release without touching
//! it while jobs run. Every attempt follows the same sequence:
//!
//! 1. Fetch the latest release and probe the installed version
//! 2. Pause dispatch, or defer if any job is in progress
//! 3. Download the candidate to the staging path (checksum when published)
//! 4. Back up the installed binary
//! 5. Verify the candidate runs and reports the release version
//! 6. Install it over the live path with an atomic rename
//! 7. Probe the live binary again
//!
//! A failure in steps 5 to 7 restores the backup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::job::JobRegistry;
use crate::metrics;

use super::config::{BinaryConfig, UpdaterConfig};
use super::error::UpdateError;
use super::feed::ReleaseFeed;
use super::probe::probe_version;
use super::types::{ReleaseAsset, ReleaseDescriptor, UpdateCheck, UpdateOutcome, UpdateStatus, Version};

/// Reason reported while jobs hold the binary.
pub const DOWNLOADS_IN_PROGRESS: &str = "Downloads in progress";

const ALREADY_UP_TO_DATE: &str = "Already up to date";

#[derive(Debug, Default)]
struct UpdaterState {
    status: UpdateStatus,
    /// Release tag `release_failures` was accumulated against.
    failed_release: Option<String>,
    /// Consecutive failed attempts at `failed_release`. Failures before a
    /// release is known (feed errors) only count toward `retry_count`.
    release_failures: u32,
}

/// Keeps the managed binary current.
pub struct BinaryUpdateManager {
    binary: BinaryConfig,
    config: UpdaterConfig,
    registry: Arc<JobRegistry>,
    feed: Arc<dyn ReleaseFeed>,
    state: RwLock<UpdaterState>,
    /// Serialises attempts.
    attempt_lock: Mutex<()>,

    // Runtime state
    running: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl BinaryUpdateManager {
    pub fn new(
        binary: BinaryConfig,
        config: UpdaterConfig,
        registry: Arc<JobRegistry>,
        feed: Arc<dyn ReleaseFeed>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            binary,
            config,
            registry,
            feed,
            state: RwLock::new(UpdaterState::default()),
            attempt_lock: Mutex::new(()),
            running: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Start the periodic update loop.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Update manager already running");
            return;
        }

        let manager = Arc::clone(self);
        let interval = Duration::from_secs(self.config.check_interval_secs);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(
            "Starting binary update manager for {} (every {:?}, feed: {})",
            self.binary.path.display(),
            interval,
            self.feed.name()
        );

        tokio::spawn(async move {
            loop {
                manager.run_scheduled_check().await;

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Update loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !manager.running.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            info!("Update loop stopped");
        });
    }

    /// Stop the periodic update loop. An attempt in flight runs to completion.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Update manager not running");
            return;
        }
        let _ = self.shutdown_tx.send(());
    }

    pub async fn status(&self) -> UpdateStatus {
        self.state.read().await.status.clone()
    }

    pub fn staging_path(&self) -> PathBuf {
        self.config
            .staging_path
            .clone()
            .unwrap_or_else(|| sibling(&self.binary.path, "new"))
    }

    pub fn backup_path(&self) -> PathBuf {
        self.config
            .backup_path
            .clone()
            .unwrap_or_else(|| sibling(&self.binary.path, "bak"))
    }

    /// Compares the installed binary with the latest release.
    ///
    /// Never reports `can_update` while a job is in progress.
    pub async fn check_for_updates(&self) -> Result<UpdateCheck, UpdateError> {
        let (check, _, _) = self.evaluate().await?;
        Ok(check)
    }

    /// Runs one update attempt.
    ///
    /// Returns `Deferred` rather than an error when jobs are running.
    pub async fn update(&self) -> Result<UpdateOutcome, UpdateError> {
        let Ok(_attempt) = self.attempt_lock.try_lock() else {
            return Err(UpdateError::AlreadyRunning);
        };

        let result = self.try_update().await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(UpdateError::RetriesExhausted { .. }) => "skipped",
            Err(UpdateError::RollbackFailed { .. }) => "rollback_failed",
            Err(_) => "failed",
        };
        metrics::BINARY_UPDATE_ATTEMPTS
            .with_label_values(&[label])
            .inc();
        result
    }

    /// Confirms a staged candidate is runnable and reports `expected`.
    pub async fn verify_new_binary(
        &self,
        staged: &Path,
        expected: &Version,
    ) -> Result<(), UpdateError> {
        if !staged.is_file() {
            return Err(UpdateError::verification(format!(
                "candidate {} is missing",
                staged.display()
            )));
        }
        set_mode(staged, 0o755).await?;

        let version = probe_version(staged, &self.binary.version_flag, self.probe_timeout())
            .await
            .map_err(|e| UpdateError::verification(format!("candidate does not run: {}", e)))?;
        if version != *expected {
            return Err(UpdateError::verification(format!(
                "candidate reports version {}, expected {}",
                version, expected
            )));
        }
        debug!("Candidate {} verified as {}", staged.display(), version);
        Ok(())
    }

    /// Copies the installed binary to the backup path.
    ///
    /// Returns `None` when nothing is installed yet.
    pub async fn backup_current_binary(&self) -> Result<Option<PathBuf>, UpdateError> {
        let live = &self.binary.path;
        if !live.exists() {
            info!("No binary installed at {}, skipping backup", live.display());
            return Ok(None);
        }

        let backup = self.backup_path();
        ensure_parent(&backup).await?;
        fs::copy(live, &backup).await?;
        info!("Backed up {} to {}", live.display(), backup.display());
        Ok(Some(backup))
    }

    /// Replaces the live binary with `staged`, keeping it executable.
    pub async fn install_new_binary(&self, staged: &Path) -> Result<(), UpdateError> {
        replace_atomically(staged, &self.binary.path).await?;
        info!("Installed {} at {}", staged.display(), self.binary.path.display());
        Ok(())
    }

    /// Restores the backup over the live binary.
    pub async fn rollback(&self) -> Result<(), UpdateError> {
        let backup = self.backup_path();
        if !backup.is_file() {
            return Err(UpdateError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no backup at {}", backup.display()),
            )));
        }
        replace_atomically(&backup, &self.binary.path).await?;
        warn!("Rolled back {} from {}", self.binary.path.display(), backup.display());
        Ok(())
    }

    async fn run_scheduled_check(&self) {
        match self.update().await {
            Ok(UpdateOutcome::Updated { from, to }) => {
                info!("Binary updated from {:?} to {}", from, to)
            }
            Ok(UpdateOutcome::Deferred { reason }) => info!("Binary update deferred: {}", reason),
            Ok(UpdateOutcome::UpToDate { version }) => debug!("Binary up to date ({})", version),
            Err(e @ UpdateError::RetriesExhausted { .. }) => debug!("{}", e),
            Err(e) => warn!("Binary update check failed: {}", e),
        }
    }

    fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.binary.probe_timeout_secs)
    }

    /// Installed version, or `None` if missing or not runnable.
    async fn installed_version(&self) -> Option<Version> {
        if !self.binary.path.exists() {
            return None;
        }
        match probe_version(&self.binary.path, &self.binary.version_flag, self.probe_timeout()).await
        {
            Ok(version) => Some(version),
            Err(e) => {
                warn!("Installed binary is not usable: {}", e);
                None
            }
        }
    }

    async fn evaluate(&self) -> Result<(UpdateCheck, ReleaseDescriptor, Version), UpdateError> {
        let release = self.feed.latest_release().await?;
        let latest = release.version().ok_or_else(|| {
            UpdateError::Feed(format!("unrecognised release tag {:?}", release.tag_name))
        })?;
        let installed = self.installed_version().await;

        let update_available = installed.as_ref().map_or(true, |current| *current < latest);
        let busy = !self.registry.in_progress_ids().await.is_empty();
        let (can_update, reason) = if busy {
            (false, Some(DOWNLOADS_IN_PROGRESS.to_string()))
        } else if !update_available {
            (false, Some(ALREADY_UP_TO_DATE.to_string()))
        } else {
            (true, None)
        };

        let check = UpdateCheck {
            update_available,
            can_update,
            reason,
            current_version: installed.as_ref().map(Version::to_string),
            latest_version: latest.to_string(),
        };

        {
            let mut state = self.state.write().await;
            state.status.last_check = Some(Utc::now());
            state.status.installed_version = check.current_version.clone();
            state.status.latest_version = Some(check.latest_version.clone());
        }
        debug!(
            "Update check: installed {:?}, latest {}, can update: {}",
            check.current_version, check.latest_version, check.can_update
        );
        Ok((check, release, latest))
    }

    async fn try_update(&self) -> Result<UpdateOutcome, UpdateError> {
        let (check, release, latest) = match self.evaluate().await {
            Ok(evaluated) => evaluated,
            Err(e) => {
                self.record_failure(None, &e).await;
                return Err(e);
            }
        };

        if !check.update_available {
            return Ok(UpdateOutcome::UpToDate {
                version: check.current_version.unwrap_or(check.latest_version),
            });
        }
        self.ensure_retries_left(&release.tag_name).await?;

        if !self.registry.try_begin_maintenance().await {
            info!(
                "Deferring update to {}: {}",
                release.tag_name, DOWNLOADS_IN_PROGRESS
            );
            return Ok(UpdateOutcome::Deferred {
                reason: DOWNLOADS_IN_PROGRESS.to_string(),
            });
        }

        {
            let mut state = self.state.write().await;
            state.status.is_updating = true;
            state.status.last_attempt = Some(Utc::now());
        }
        info!(
            "Updating {} from {:?} to {}",
            self.binary.path.display(),
            check.current_version,
            latest
        );

        let result = self.install_release(&release, &latest).await;
        self.registry.end_maintenance().await;
        self.state.write().await.status.is_updating = false;

        match result {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.status.retry_count = 0;
                state.status.last_error = None;
                state.status.installed_version = Some(latest.to_string());
                state.failed_release = None;
                state.release_failures = 0;
                Ok(UpdateOutcome::Updated {
                    from: check.current_version,
                    to: latest.to_string(),
                })
            }
            Err(e) => {
                error!("Update to {} failed: {}", release.tag_name, e);
                self.record_failure(Some(&release.tag_name), &e).await;
                Err(e)
            }
        }
    }

    async fn install_release(
        &self,
        release: &ReleaseDescriptor,
        latest: &Version,
    ) -> Result<(), UpdateError> {
        let asset = release
            .find_asset(&self.config.asset_name)
            .ok_or_else(|| UpdateError::NoMatchingAsset {
                tag: release.tag_name.clone(),
                asset: self.config.asset_name.clone(),
            })?;

        let staging = self.staging_path();
        ensure_parent(&staging).await?;
        let result = self.stage_and_install(asset, &staging, latest).await;

        if let Err(e) = fs::remove_file(&staging).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", staging.display(), e);
            }
        }
        result
    }

    async fn stage_and_install(
        &self,
        asset: &ReleaseAsset,
        staging: &Path,
        latest: &Version,
    ) -> Result<(), UpdateError> {
        let bytes = self.feed.download_asset(asset, staging).await?;
        debug!("Downloaded {} ({} bytes)", asset.name, bytes);
        if let Some(expected) = asset.sha256() {
            verify_checksum(staging, expected).await?;
        }

        let backup = self.backup_current_binary().await?;

        let installed = async {
            self.verify_new_binary(staging, latest).await?;
            self.install_new_binary(staging).await?;
            self.post_install_check(latest).await
        }
        .await;
        let Err(cause) = installed else {
            return Ok(());
        };

        warn!("Update to {} failed, restoring previous binary: {}", latest, cause);
        match backup {
            Some(_) => {
                if let Err(e) = self.rollback().await {
                    return Err(UpdateError::RollbackFailed {
                        cause: cause.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
            None => {
                if self.binary.path.exists() {
                    fs::remove_file(&self.binary.path).await?;
                }
            }
        }
        Err(cause)
    }

    async fn post_install_check(&self, expected: &Version) -> Result<(), UpdateError> {
        let version = probe_version(&self.binary.path, &self.binary.version_flag, self.probe_timeout())
            .await
            .map_err(|e| UpdateError::verification(format!("installed binary does not run: {}", e)))?;
        if version != *expected {
            return Err(UpdateError::verification(format!(
                "installed binary reports version {}, expected {}",
                version, expected
            )));
        }
        Ok(())
    }

    async fn ensure_retries_left(&self, tag: &str) -> Result<(), UpdateError> {
        let state = self.state.read().await;
        if state.failed_release.as_deref() == Some(tag)
            && state.release_failures >= self.config.max_retries
        {
            return Err(UpdateError::RetriesExhausted {
                tag: tag.to_string(),
                attempts: state.release_failures,
            });
        }
        Ok(())
    }

    async fn record_failure(&self, tag: Option<&str>, error: &UpdateError) {
        let mut state = self.state.write().await;
        if let Some(tag) = tag {
            if state.failed_release.as_deref() != Some(tag) {
                state.failed_release = Some(tag.to_string());
                state.release_failures = 0;
                state.status.retry_count = 0;
            }
            state.release_failures = state.release_failures.saturating_add(1);
        }
        state.status.retry_count = state.status.retry_count.saturating_add(1);
        state.status.last_error = Some(error.to_string());
    }
}

/// `<dir>/<name>.<suffix>` next to `path`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "binary".to_string());
    path.with_file_name(format!("{}.{}", name, suffix))
}

async fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent).await,
        _ => Ok(()),
    }
}

/// Copies `source` next to `live` and renames it into place.
///
/// The live path never holds a partial file, and a running process keeps
/// its old inode.
async fn replace_atomically(source: &Path, live: &Path) -> Result<(), UpdateError> {
    ensure_parent(live).await?;
    let mode = executable_mode(live).await;
    let name = live
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "binary".to_string());
    let temp = live.with_file_name(format!(".{}.tmp", name));

    fs::copy(source, &temp).await?;
    let placed: std::io::Result<()> = async {
        set_mode(&temp, mode).await?;
        fs::rename(&temp, live).await
    }
    .await;
    if let Err(e) = placed {
        let _ = fs::remove_file(&temp).await;
        return Err(e.into());
    }
    Ok(())
}

async fn verify_checksum(path: &Path, expected: &str) -> Result<(), UpdateError> {
    let mut file = fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    let actual = format!("{:x}", hasher.finalize());
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(UpdateError::ChecksumMismatch {
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Mode for a replacement binary: the live file's bits, at least `rwxr-xr-x`.
#[cfg(unix)]
async fn executable_mode(live: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    fs::metadata(live)
        .await
        .map(|meta| (meta.permissions().mode() & 0o7777) | 0o755)
        .unwrap_or(0o755)
}

#[cfg(not(unix))]
async fn executable_mode(_live: &Path) -> u32 {
    0o755
}
