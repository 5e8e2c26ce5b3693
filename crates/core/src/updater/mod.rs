//! Managed binary updates.
//!
//! [`BinaryUpdateManager`] periodically compares the installed executable
//! with the latest release from a [`ReleaseFeed`] and swaps it in place:
//! - **Gate**: never while a job is in progress; dispatch pauses during a swap
//! - **Safety**: backup first, verify, atomic install, self-check, rollback
//! - **Bounded**: failed attempts per release are capped by `max_retries`

mod config;
mod error;
mod feed;
mod manager;
mod probe;
mod types;

pub use config::{BinaryConfig, UpdaterConfig};
pub use error::UpdateError;
pub use feed::{GithubReleaseFeed, ReleaseFeed};
pub use manager::{BinaryUpdateManager, DOWNLOADS_IN_PROGRESS};
pub use probe::{probe_version, probe_version_line};
pub use types::{
    ReleaseAsset, ReleaseDescriptor, UpdateCheck, UpdateOutcome, UpdateStatus, Version,
};
