//! Core of the reelhaul download service.
//!
//! - [`job`]: job model, pending queue and the shared registry
//! - [`scheduler`]: bounded-concurrency dispatch and per-job supervision
//! - [`service`]: validated job API used by the HTTP layer
//! - [`executor`]: yt-dlp/ffmpeg execution behind the [`JobExecutor`] trait
//! - [`updater`]: safe in-place updates of the yt-dlp binary

pub mod config;
pub mod executor;
pub mod job;
pub mod metrics;
pub mod scheduler;
pub mod service;
pub mod testing;
pub mod updater;

pub use config::{
    load_config, load_config_from_str, load_config_or_default, validate_config, Config,
    ConfigError, ServerConfig,
};
pub use executor::{
    ArtifactStore, ExecutionEvent, ExecutionOutput, ExecutionRequest, ExecutorConfig,
    ExecutorError, JobExecutor, LocalArtifactStore, StorageConfig, YtDlpExecutor,
};
pub use job::{
    CreateJobRequest, Job, JobError, JobId, JobKind, JobQueue, JobRegistry, JobSnapshot,
    JobStatus, RegistryCounts, TimeRange,
};
pub use scheduler::{JobScheduler, SchedulerConfig, SchedulerStatus};
pub use service::JobService;
pub use updater::{
    BinaryConfig, BinaryUpdateManager, GithubReleaseFeed, ReleaseAsset, ReleaseDescriptor,
    ReleaseFeed, UpdateCheck, UpdateError, UpdateOutcome, UpdateStatus, UpdaterConfig, Version,
};
