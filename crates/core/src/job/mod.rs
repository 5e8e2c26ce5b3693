//! Jobs: data model, pending queue and the shared registry.

mod error;
mod queue;
mod registry;
mod types;

pub use error::JobError;
pub use queue::JobQueue;
pub use registry::{Dispatch, ExecutionOutcome, JobRegistry, RegistryCounts};
pub use types::{CreateJobRequest, Job, JobId, JobKind, JobSnapshot, JobStatus, TimeRange};
