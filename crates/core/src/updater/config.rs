//! Configuration for the managed binary and its updater.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The external executable jobs depend on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryConfig {
    /// Path of the installed binary. Replaced in place by updates.
    #[serde(default = "default_binary_path")]
    pub path: PathBuf,

    /// Flag that makes the binary print its version as a single line.
    #[serde(default = "default_version_flag")]
    pub version_flag: String,

    /// Upper bound for a version probe (seconds).
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_binary_path() -> PathBuf {
    PathBuf::from("bin/yt-dlp")
}

fn default_version_flag() -> String {
    "--version".to_string()
}

fn default_probe_timeout() -> u64 {
    15
}

impl Default for BinaryConfig {
    fn default() -> Self {
        Self {
            path: default_binary_path(),
            version_flag: default_version_flag(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Configuration for periodic binary updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Enable the periodic update check.
    #[serde(default)]
    pub enabled: bool,

    /// URL returning the latest release as JSON (GitHub releases API shape).
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Name of the release asset to install.
    #[serde(default = "default_asset_name")]
    pub asset_name: String,

    /// Time between checks (seconds).
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// Failed attempts allowed per release before giving up on it.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Where candidates are downloaded (default: `<binary>.new`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_path: Option<PathBuf>,

    /// Where the current binary is backed up (default: `<binary>.bak`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<PathBuf>,

    /// Timeout for feed and asset requests (seconds).
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    /// User-Agent sent to the release feed.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_feed_url() -> String {
    "https://api.github.com/repos/yt-dlp/yt-dlp/releases/latest".to_string()
}

fn default_asset_name() -> String {
    "yt-dlp".to_string()
}

fn default_check_interval() -> u64 {
    86_400 // daily
}

fn default_max_retries() -> u32 {
    3
}

fn default_download_timeout() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("reelhaul/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            feed_url: default_feed_url(),
            asset_name: default_asset_name(),
            check_interval_secs: default_check_interval(),
            max_retries: default_max_retries(),
            staging_path: None,
            backup_path: None,
            download_timeout_secs: default_download_timeout(),
            user_agent: default_user_agent(),
        }
    }
}
