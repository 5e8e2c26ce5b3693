//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the external collaborator
//! traits, so the scheduler and updater can be exercised without yt-dlp,
//! ffmpeg or network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelhaul_core::testing::{MockExecutor, MockReleaseFeed};
//!
//! let executor = Arc::new(MockExecutor::new().with_delay(Duration::from_millis(50)));
//! let feed = Arc::new(MockReleaseFeed::with_release("2024.02.01", &["yt-dlp"]));
//!
//! let scheduler = JobScheduler::new(SchedulerConfig::default(), registry.clone(), executor);
//! let updater = BinaryUpdateManager::new(binary, updater_config, registry, feed);
//! ```

mod mock_executor;
mod mock_release_feed;

pub use mock_executor::MockExecutor;
pub use mock_release_feed::MockReleaseFeed;

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::job::{CreateJobRequest, TimeRange};

    /// A request for a whole video.
    pub fn video_request(url: &str) -> CreateJobRequest {
        CreateJobRequest {
            url: url.to_string(),
            time_range: None,
        }
    }

    /// A request for a clip between two `HH:MM:SS` timestamps.
    pub fn clip_request(url: &str, start: &str, end: &str) -> CreateJobRequest {
        CreateJobRequest {
            url: url.to_string(),
            time_range: Some(TimeRange {
                start: start.to_string(),
                end: end.to_string(),
            }),
        }
    }

    /// Shell script that prints `version` when run with any argument.
    pub fn version_script(version: &str) -> Vec<u8> {
        format!("#!/bin/sh\necho \"{}\"\n", version).into_bytes()
    }

    /// Shell script that always fails.
    pub fn broken_script() -> Vec<u8> {
        b"#!/bin/sh\necho 'corrupt download' >&2\nexit 1\n".to_vec()
    }
}
