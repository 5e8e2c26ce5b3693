//! HTTP surface of the reelhaul daemon.

pub mod api;
pub mod metrics;
pub mod state;
