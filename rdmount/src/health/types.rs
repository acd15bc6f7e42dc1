//! Health records and reports.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Why an item is unhealthy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnhealthyReason {
    /// Downloading without progress.
    Stalled,
    /// The service reports the item as failed, dead or infected.
    DeadLinks,
    /// Every selected file is an archive; nothing is playable.
    ArchiveOnly,
    /// Still queued or waiting for file selection.
    NoProgress,
}

impl fmt::Display for UnhealthyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stalled => "stalled",
            Self::DeadLinks => "dead-links",
            Self::ArchiveOnly => "archive-only",
            Self::NoProgress => "no-progress",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy(UnhealthyReason),
    /// Deleted and re-added; evaluated again next check.
    Repairing,
    Deleted,
}

impl HealthStatus {
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => f.write_str("healthy"),
            Self::Unhealthy(reason) => write!(f, "unhealthy ({})", reason),
            Self::Repairing => f.write_str("repairing"),
            Self::Deleted => f.write_str("deleted"),
        }
    }
}

/// Health of one remote item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub item_id: String,
    pub name: String,
    pub status: HealthStatus,
    pub last_checked: DateTime<Utc>,
    pub repair_attempts: u32,
}

/// Per-status counts and the unhealthy items.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub unhealthy: usize,
    pub repairing: usize,
    pub deleted: usize,
    pub unhealthy_items: Vec<HealthRecord>,
}

/// Outcome of one check.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub checked: usize,
    /// Ids of the re-added items.
    pub repaired: Vec<String>,
    pub deleted: Vec<String>,
    /// Ids of items that turned unhealthy this check and stay unhealthy.
    pub flagged: Vec<String>,
    pub summary: HealthSummary,
}

impl CheckReport {
    pub fn changed(&self) -> bool {
        !self.repaired.is_empty() || !self.deleted.is_empty()
    }
}
