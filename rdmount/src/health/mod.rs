//! Health monitoring of remote items.
//!
//! Flags dead, stalled, idle and archive-only items, repairs them by
//! re-adding from source and reports per-status summaries.

mod daemon;
mod error;
mod monitor;
mod types;

pub use daemon::HealthDaemon;
pub use error::HealthError;
pub use monitor::{is_archive_only, HealthConfig, HealthMonitor};
pub use types::{CheckReport, HealthRecord, HealthStatus, HealthSummary, UnhealthyReason};
