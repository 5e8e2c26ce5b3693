//! yt-dlp based executor implementation.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::job::{JobKind, TimeRange};

use super::config::ExecutorConfig;
use super::error::ExecutorError;
use super::termination_requested;
use super::traits::{ArtifactStore, JobExecutor};
use super::types::{ExecutionEvent, ExecutionOutput, ExecutionRequest};

static PROGRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[download\]\s+(\d+(?:\.\d+)?)%").expect("valid regex"));

/// Keep at most this much stderr for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// Per-job scratch directory, removed on drop unless kept.
///
/// Dropping also covers an execution future that is aborted mid-run.
struct WorkDir {
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    async fn create(path: PathBuf, keep: bool) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path, keep })
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to clean up {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Runs jobs by driving the yt-dlp and ffmpeg executables.
pub struct YtDlpExecutor {
    config: ExecutorConfig,
    binary_path: PathBuf,
    store: Arc<dyn ArtifactStore>,
}

impl YtDlpExecutor {
    pub fn new(config: ExecutorConfig, binary_path: PathBuf, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            binary_path,
            store,
        }
    }

    fn probe_args(url: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--skip-download".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            url.to_string(),
        ]
    }

    fn download_args(&self, url: &str, output_template: &Path) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--newline".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            self.config.format.clone(),
            "-o".to_string(),
            output_template.to_string_lossy().to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(url.to_string());
        args
    }

    /// ffmpeg arguments to cut `range` out of `input` without re-encoding.
    fn trim_args(input: &Path, output: &Path, range: &TimeRange) -> Option<Vec<String>> {
        let start = range.start_secs()?;
        let end = range.end_secs()?;
        if end <= start {
            return None;
        }
        Some(vec![
            "-y".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-ss".to_string(),
            start.to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-t".to_string(),
            (end - start).to_string(),
            "-c".to_string(),
            "copy".to_string(),
            output.to_string_lossy().to_string(),
        ])
    }

    fn parse_progress(line: &str) -> Option<f32> {
        PROGRESS_RE
            .captures(line.trim())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<f32>().ok())
    }

    fn parse_metadata(output: &str) -> Result<(Option<String>, Option<String>), ExecutorError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            title: Option<String>,
            description: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output.trim()).map_err(|e| {
            ExecutorError::stage_failed("probe", format!("unreadable metadata: {}", e))
        })?;
        Ok((probe.title, probe.description))
    }

    /// Finds the file yt-dlp produced for `stem` in `dir`.
    async fn find_output(dir: &Path, stem: &str) -> Result<PathBuf, ExecutorError> {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let prefix = format!("{}.", stem);
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with(&prefix) && !name.ends_with(".part") && !name.ends_with(".ytdl") {
                return Ok(entry.path());
            }
        }
        Err(ExecutorError::stage_failed(
            "download",
            "no output file produced",
        ))
    }

    /// Spawns `program` and feeds each stdout line to `on_line`.
    ///
    /// Kills the child and returns `Terminated` as soon as termination is
    /// requested.
    async fn run_child(
        program: &Path,
        args: &[String],
        stage: &str,
        terminate: &mut watch::Receiver<bool>,
        mut on_line: impl FnMut(&str) + Send,
    ) -> Result<(), ExecutorError> {
        if *terminate.borrow() {
            return Err(ExecutorError::Terminated);
        }

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ExecutorError::BinaryNotFound {
                        path: program.to_path_buf(),
                    }
                } else {
                    ExecutorError::Io(e)
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::stage_failed(stage, "stdout not captured"))?;
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_end(&mut buf).await;
            }
            let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
            String::from_utf8_lossy(&buf[start..]).trim().to_string()
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = termination_requested(terminate) => {
                    debug!("Killing {} ({})", program.display(), stage);
                    let _ = child.kill().await;
                    stderr_task.abort();
                    return Err(ExecutorError::Terminated);
                }
                line = lines.next_line() => match line? {
                    Some(line) => on_line(&line),
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            _ = termination_requested(terminate) => {
                let _ = child.kill().await;
                stderr_task.abort();
                return Err(ExecutorError::Terminated);
            }
            status = child.wait() => status?,
        };
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let reason = if stderr.is_empty() {
                format!("{} exited with code {:?}", program.display(), status.code())
            } else {
                stderr
            };
            return Err(ExecutorError::stage_failed(stage, reason));
        }
        Ok(())
    }

    async fn run_video(
        &self,
        job_id: &str,
        url: &str,
        time_range: Option<&TimeRange>,
        job_dir: &Path,
        events: &mpsc::Sender<ExecutionEvent>,
        terminate: &mut watch::Receiver<bool>,
    ) -> Result<ExecutionOutput, ExecutorError> {
        // Metadata probe
        let mut probe_output = String::new();
        Self::run_child(
            &self.binary_path,
            &Self::probe_args(url),
            "probe",
            terminate,
            |line| {
                probe_output.push_str(line);
                probe_output.push('\n');
            },
        )
        .await?;
        let (title, description) = Self::parse_metadata(&probe_output)?;
        let _ = events
            .send(ExecutionEvent::Metadata { title, description })
            .await;

        // Download
        let template = job_dir.join("source.%(ext)s");
        Self::run_child(
            &self.binary_path,
            &self.download_args(url, &template),
            "download",
            terminate,
            |line| {
                if let Some(percent) = Self::parse_progress(line) {
                    let _ = events.try_send(ExecutionEvent::Progress { percent });
                }
            },
        )
        .await?;
        let mut artifact = Self::find_output(job_dir, "source").await?;

        // Conversion
        if let Some(range) = time_range {
            let _ = events.send(ExecutionEvent::ConversionStarted).await;
            let extension = artifact
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_else(|| "mp4".to_string());
            let clip = job_dir.join(format!("clip.{}", extension));
            let args = Self::trim_args(&artifact, &clip, range).ok_or_else(|| {
                ExecutorError::stage_failed("convert", "invalid time range")
            })?;
            Self::run_child(&self.config.ffmpeg_path, &args, "convert", terminate, |_| {}).await?;
            artifact = clip;
            let _ = events.send(ExecutionEvent::ConversionFinished).await;
        }

        // Upload
        if *terminate.borrow() {
            return Err(ExecutorError::Terminated);
        }
        let _ = events.send(ExecutionEvent::UploadStarted).await;
        let url = self.store.upload(job_id, &artifact).await?;
        let urls = vec![url];
        let _ = events
            .send(ExecutionEvent::Uploaded { urls: urls.clone() })
            .await;

        Ok(ExecutionOutput {
            download_urls: urls,
        })
    }
}

#[async_trait]
impl JobExecutor for YtDlpExecutor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn execute(
        &self,
        request: ExecutionRequest,
        events: mpsc::Sender<ExecutionEvent>,
        mut terminate: watch::Receiver<bool>,
    ) -> Result<ExecutionOutput, ExecutorError> {
        let work_dir = WorkDir::create(
            self.config.work_dir.join(&request.job_id),
            self.config.keep_work_files,
        )
        .await?;
        let job_dir = work_dir.path.as_path();
        info!("Executing job {} in {}", request.job_id, job_dir.display());

        let run = async {
            match &request.kind {
                JobKind::VideoDownload { url, time_range } => {
                    self.run_video(
                        &request.job_id,
                        url,
                        time_range.as_ref(),
                        job_dir,
                        &events,
                        &mut terminate,
                    )
                    .await
                }
            }
        };

        match timeout(Duration::from_secs(self.config.timeout_secs), run).await {
            Ok(result) => result,
            Err(_) => Err(ExecutorError::Timeout {
                timeout_secs: self.config.timeout_secs,
            }),
        }
    }
}
