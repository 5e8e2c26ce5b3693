//! Execution collaborators: the code that actually downloads, trims and
//! publishes media for a job.
//!
//! The scheduler only knows the [`JobExecutor`] trait. It hands over an
//! [`ExecutionRequest`], listens for [`ExecutionEvent`]s, and asks for
//! termination through a watch channel.
//!
//! # Example
//!
//! ```ignore
//! use reelhaul_core::executor::{YtDlpExecutor, ExecutorConfig, LocalArtifactStore, StorageConfig};
//!
//! let store = Arc::new(LocalArtifactStore::new(StorageConfig::default()));
//! let executor = YtDlpExecutor::new(ExecutorConfig::default(), "yt-dlp".into(), store);
//!
//! let (events_tx, mut events_rx) = tokio::sync::mpsc::channel(32);
//! let (terminate_tx, terminate_rx) = tokio::sync::watch::channel(false);
//! let output = executor.execute(request, events_tx, terminate_rx).await?;
//! println!("Published: {:?}", output.download_urls);
//! ```

mod config;
mod error;
mod store;
mod traits;
mod types;
mod ytdlp;

pub use config::{ExecutorConfig, StorageConfig};
pub use error::ExecutorError;
pub use store::LocalArtifactStore;
pub use traits::{ArtifactStore, JobExecutor};
pub use types::{ExecutionEvent, ExecutionOutput, ExecutionRequest};
pub use ytdlp::YtDlpExecutor;

use tokio::sync::watch;

/// Resolves once termination is requested; never if the sender is gone.
pub(crate) async fn termination_requested(terminate: &mut watch::Receiver<bool>) {
    if terminate.wait_for(|requested| *requested).await.is_err() {
        std::future::pending::<()>().await;
    }
}
