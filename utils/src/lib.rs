//! Shared utilities for the ORV consensus node.

pub mod logging;
pub mod stats;
pub mod time;

pub use logging::init_tracing;
pub use stats::Stats;
pub use time::{format_duration, milliseconds_since_epoch};
