//! Supporting pieces used across the crate: channel crypto primitives,
//! subscriber setup, deadline helpers and runtime counters.

pub mod crypto;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
