//! Job scheduler.
//!
//! Moves jobs from the registry's queue into execution while respecting the
//! concurrency limit, and supervises each running execution:
//! - **Dispatch**: woken on registration, completion, or a poll tick
//! - **Supervision**: one task per running job, relaying executor events
//! - **Cancellation**: waits for the executor to stop, then aborts it

mod config;
mod runner;
mod types;

pub use config::SchedulerConfig;
pub use runner::JobScheduler;
pub use types::SchedulerStatus;
