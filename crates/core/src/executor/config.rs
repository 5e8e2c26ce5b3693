//! Configuration for the executor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the yt-dlp based executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Path to ffmpeg binary (used for trimming).
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Scratch directory; each job works in its own subdirectory.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// yt-dlp format selector.
    #[serde(default = "default_format")]
    pub format: String,

    /// Timeout for a whole job in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Keep the per-job scratch directory after the job ends.
    #[serde(default)]
    pub keep_work_files: bool,

    /// Additional yt-dlp arguments for the download stage.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("reelhaul-work")
}

fn default_format() -> String {
    "bv*+ba/b".to_string()
}

fn default_timeout() -> u64 {
    3600 // 1 hour
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            work_dir: default_work_dir(),
            format: default_format(),
            timeout_secs: default_timeout(),
            keep_work_files: false,
            extra_args: Vec::new(),
        }
    }
}

/// Where finished artifacts are published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory artifacts are copied into.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Base URL under which `output_dir` is served.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_public_base_url() -> String {
    "http://localhost:8080/artifacts".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            public_base_url: default_public_base_url(),
        }
    }
}
