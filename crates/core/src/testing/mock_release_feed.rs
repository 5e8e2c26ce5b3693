//! Mock release feed for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::updater::{ReleaseAsset, ReleaseDescriptor, ReleaseFeed, UpdateError};

/// Mock implementation of the ReleaseFeed trait.
///
/// Serves a configurable release and asset bodies from memory, and records
/// which assets were downloaded.
///
/// # Example
///
/// ```rust,ignore
/// use reelhaul_core::testing::MockReleaseFeed;
///
/// let feed = MockReleaseFeed::with_release("2024.02.01", &["yt-dlp"]);
/// feed.set_asset("yt-dlp", b"#!/bin/sh\necho 2024.02.01\n".to_vec()).await;
/// ```
#[derive(Debug, Default)]
pub struct MockReleaseFeed {
    /// Release returned by `latest_release`.
    release: Arc<RwLock<Option<ReleaseDescriptor>>>,
    /// Asset bodies by asset name.
    assets: Arc<RwLock<HashMap<String, Vec<u8>>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<UpdateError>>>,
    /// Names of downloaded assets, in order.
    downloads: Arc<RwLock<Vec<String>>>,
}

impl MockReleaseFeed {
    /// Create a feed with no release published.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a feed publishing `tag` with the named (empty) assets.
    pub fn with_release(tag: &str, asset_names: &[&str]) -> Self {
        Self {
            release: Arc::new(RwLock::new(Some(Self::release(tag, asset_names)))),
            ..Default::default()
        }
    }

    /// Build a release descriptor with the named assets.
    pub fn release(tag: &str, asset_names: &[&str]) -> ReleaseDescriptor {
        ReleaseDescriptor {
            tag_name: tag.to_string(),
            published_at: Some(chrono::Utc::now()),
            assets: asset_names
                .iter()
                .map(|name| ReleaseAsset {
                    name: name.to_string(),
                    browser_download_url: format!("https://mock.invalid/{}/{}", tag, name),
                    size: 0,
                    digest: None,
                })
                .collect(),
        }
    }

    /// Replace the published release.
    pub async fn set_release(&self, release: ReleaseDescriptor) {
        *self.release.write().await = Some(release);
    }

    /// Set the body served for an asset.
    pub async fn set_asset(&self, name: &str, body: Vec<u8>) {
        self.assets.write().await.insert(name.to_string(), body);
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: UpdateError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get the number of asset downloads performed.
    pub async fn download_count(&self) -> usize {
        self.downloads.read().await.len()
    }

    /// Get the names of downloaded assets.
    pub async fn recorded_downloads(&self) -> Vec<String> {
        self.downloads.read().await.clone()
    }
}

#[async_trait]
impl ReleaseFeed for MockReleaseFeed {
    fn name(&self) -> &str {
        "mock"
    }

    async fn latest_release(&self) -> Result<ReleaseDescriptor, UpdateError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.release
            .read()
            .await
            .clone()
            .ok_or_else(|| UpdateError::Feed("no release published".to_string()))
    }

    async fn download_asset(
        &self,
        asset: &ReleaseAsset,
        destination: &Path,
    ) -> Result<u64, UpdateError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }
        self.downloads.write().await.push(asset.name.clone());

        let body = self
            .assets
            .read()
            .await
            .get(&asset.name)
            .cloned()
            .ok_or_else(|| UpdateError::Feed(format!("asset {} returned 404", asset.name)))?;
        tokio::fs::write(destination, &body).await?;
        Ok(body.len() as u64)
    }
}
