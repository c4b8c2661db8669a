//! Application Services
//!
//! Long-lived stream drivers that sit between a bus subscription and a
//! streaming caller.
//!
//! - `live_log`: forwards every call event verbatim
//! - `statistics`: folds call events into windowed snapshots

/// Raw call event tail.
pub mod live_log;

/// Windowed statistics aggregation.
pub mod statistics;

pub use live_log::forward_events;
pub use statistics::{MAX_INTERVAL, StatsAggregator};
