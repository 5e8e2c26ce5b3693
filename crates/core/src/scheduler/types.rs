//! Types for the job scheduler.

use serde::{Deserialize, Serialize};

/// Current status of the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStatus {
    /// Whether the dispatch loop is running.
    pub running: bool,
    /// Configured concurrency limit.
    pub max_concurrent_jobs: usize,
    /// Jobs currently holding a slot.
    pub in_progress: usize,
    /// Jobs waiting in the queue.
    pub queued: usize,
    /// Dispatch is paused for a binary update.
    pub paused: bool,
}
