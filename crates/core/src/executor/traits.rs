//! Trait definitions for the executor module.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::{mpsc, watch};

use super::error::ExecutorError;
use super::types::{ExecutionEvent, ExecutionOutput, ExecutionRequest};

/// Performs the actual work of a job.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Returns the name of this executor implementation.
    fn name(&self) -> &str;

    /// Runs a job to completion.
    ///
    /// Stage transitions are sent on `events` as they happen. When
    /// `terminate` flips to `true` the executor must stop its work and return
    /// [`ExecutorError::Terminated`]; returning is the confirmation.
    async fn execute(
        &self,
        request: ExecutionRequest,
        events: mpsc::Sender<ExecutionEvent>,
        terminate: watch::Receiver<bool>,
    ) -> Result<ExecutionOutput, ExecutorError>;
}

/// Publishes finished artifacts and returns their public URL.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, job_id: &str, path: &Path) -> Result<String, ExecutorError>;
}
