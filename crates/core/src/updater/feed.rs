//! Release feed clients.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::ACCEPT;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::config::UpdaterConfig;
use super::error::UpdateError;
use super::types::{ReleaseAsset, ReleaseDescriptor};

/// Source of release information and release assets.
#[async_trait]
pub trait ReleaseFeed: Send + Sync {
    /// Returns the name of this feed implementation.
    fn name(&self) -> &str;

    /// Fetches the latest release.
    async fn latest_release(&self) -> Result<ReleaseDescriptor, UpdateError>;

    /// Downloads `asset` to `destination`, returning the number of bytes written.
    async fn download_asset(
        &self,
        asset: &ReleaseAsset,
        destination: &Path,
    ) -> Result<u64, UpdateError>;
}

/// Reads releases from a GitHub-style `releases/latest` endpoint.
pub struct GithubReleaseFeed {
    client: Client,
    feed_url: String,
}

impl GithubReleaseFeed {
    pub fn new(config: &UpdaterConfig) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.download_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            feed_url: config.feed_url.clone(),
        })
    }
}

#[async_trait]
impl ReleaseFeed for GithubReleaseFeed {
    fn name(&self) -> &str {
        "github"
    }

    async fn latest_release(&self) -> Result<ReleaseDescriptor, UpdateError> {
        debug!("Fetching latest release from {}", self.feed_url);
        let response = self
            .client
            .get(&self.feed_url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpdateError::Feed(format!(
                "{} returned {}",
                self.feed_url,
                response.status()
            )));
        }

        Ok(response.json::<ReleaseDescriptor>().await?)
    }

    async fn download_asset(
        &self,
        asset: &ReleaseAsset,
        destination: &Path,
    ) -> Result<u64, UpdateError> {
        debug!(
            "Downloading {} to {}",
            asset.browser_download_url,
            destination.display()
        );
        let response = self
            .client
            .get(&asset.browser_download_url)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(UpdateError::Feed(format!(
                "asset download returned {}",
                response.status()
            )));
        }

        let mut file = File::create(destination).await?;
        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        file.sync_all().await?;

        if asset.size > 0 && written != asset.size {
            return Err(UpdateError::Feed(format!(
                "incomplete download: got {} of {} bytes",
                written, asset.size
            )));
        }
        Ok(written)
    }
}
