//! Health evaluation and repair of remote items.
//!
//! Each check lists every item on the account and evaluates it:
//!
//! | Service state               | Verdict                                    |
//! |-----------------------------|--------------------------------------------|
//! | error, dead, virus          | `dead-links`                               |
//! | downloading, no progress    | `stalled` after `stall_checks` checks      |
//! | queued, awaiting selection  | `no-progress` after `stall_checks` checks  |
//! | downloaded, only archives   | `archive-only`                             |
//!
//! Archive-only items are deleted when cleanup is enabled and never
//! repaired. Other unhealthy items are deleted and re-added from their
//! source while repair attempts remain, then left unhealthy.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::error::HealthError;
use super::types::{CheckReport, HealthRecord, HealthStatus, HealthSummary, UnhealthyReason};
use crate::cache::MetadataCache;
use crate::config::{HealthSettings, DEFAULT_MAX_REPAIR_ATTEMPTS, DEFAULT_STALL_CHECKS};
use crate::media::is_archive;
use crate::notify::{ChangeEvent, ChangeNotifier};
use crate::remote::{ItemStatus, RemoteApi, RemoteError, RemoteItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthConfig {
    pub repair: bool,
    pub max_repair_attempts: u32,
    pub cleanup_archives: bool,
    pub stall_checks: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            repair: true,
            max_repair_attempts: DEFAULT_MAX_REPAIR_ATTEMPTS,
            cleanup_archives: true,
            stall_checks: DEFAULT_STALL_CHECKS,
        }
    }
}

impl From<&HealthSettings> for HealthConfig {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            repair: settings.repair,
            max_repair_attempts: settings.max_repair_attempts,
            cleanup_archives: settings.cleanup_archives,
            stall_checks: settings.stall_checks,
        }
    }
}

impl HealthConfig {
    /// Evaluate without deleting or re-adding anything.
    pub fn report_only(mut self) -> Self {
        self.repair = false;
        self.cleanup_archives = false;
        self
    }
}

/// Whether every selected file of an item is an archive.
pub fn is_archive_only(item: &RemoteItem) -> bool {
    let files = item.selected_files();
    !files.is_empty() && files.iter().all(|f| is_archive(f.file_name()))
}

struct Tracked {
    record: HealthRecord,
    last_status: Option<ItemStatus>,
    last_progress: f64,
    stuck_checks: u32,
    archive_only: Option<bool>,
}

impl Tracked {
    fn new(item: &RemoteItem) -> Self {
        Self {
            record: HealthRecord {
                item_id: item.id.clone(),
                name: item.name.clone(),
                status: HealthStatus::Healthy,
                last_checked: Utc::now(),
                repair_attempts: 0,
            },
            last_status: None,
            last_progress: 0.0,
            stuck_checks: 0,
            archive_only: None,
        }
    }

    /// Update the progress counters and return the status-based verdict.
    fn observe(&mut self, item: &RemoteItem, stall_checks: u32) -> Option<UnhealthyReason> {
        let progressed = self.last_status != Some(item.status) || item.progress > self.last_progress;
        if progressed {
            self.stuck_checks = 0;
        } else {
            self.stuck_checks += 1;
        }
        self.last_status = Some(item.status);
        self.last_progress = item.progress;

        match item.status {
            ItemStatus::Error | ItemStatus::Dead | ItemStatus::Virus => {
                Some(UnhealthyReason::DeadLinks)
            }
            ItemStatus::Downloading if self.stuck_checks >= stall_checks => {
                Some(UnhealthyReason::Stalled)
            }
            ItemStatus::Queued | ItemStatus::NeedsSelection
                if self.stuck_checks >= stall_checks =>
            {
                Some(UnhealthyReason::NoProgress)
            }
            _ => None,
        }
    }

    /// What remains of a record whose item is no longer listed.
    ///
    /// Deleted records and unhealthy records with no repairs left are
    /// terminal and stay reported as deleted; anything else is forgotten.
    fn into_terminal(mut self, max_repair_attempts: u32) -> Option<Self> {
        let exhausted = self.record.status.is_unhealthy()
            && self.record.repair_attempts >= max_repair_attempts;
        if self.record.status != HealthStatus::Deleted && !exhausted {
            return None;
        }
        self.record.status = HealthStatus::Deleted;
        Some(self)
    }

    /// Forget per-item observations after the item was re-added.
    fn rekey(&mut self, new_id: &str) {
        self.record.item_id = new_id.to_string();
        self.record.repair_attempts += 1;
        self.record.status = HealthStatus::Repairing;
        self.last_status = None;
        self.last_progress = 0.0;
        self.stuck_checks = 0;
        self.archive_only = None;
    }
}

/// Evaluates and repairs remote items.
///
/// Single-threaded: the owning loop calls [`check`](Self::check) once per
/// interval.
pub struct HealthMonitor {
    remote: Arc<dyn RemoteApi>,
    cache: Option<Arc<MetadataCache>>,
    config: HealthConfig,
    notifier: Arc<dyn ChangeNotifier>,
    records: HashMap<String, Tracked>,
}

impl HealthMonitor {
    pub fn new(
        remote: Arc<dyn RemoteApi>,
        config: HealthConfig,
        notifier: Arc<dyn ChangeNotifier>,
    ) -> Self {
        Self {
            remote,
            cache: None,
            config,
            notifier,
            records: HashMap::new(),
        }
    }

    /// Invalidate this cache for every item deleted or re-added.
    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> HealthConfig {
        self.config
    }

    /// Evaluate every item once, repairing or deleting as configured.
    pub async fn check(&mut self) -> Result<CheckReport, HealthError> {
        let items = self.remote.list_items().await?;
        let mut previous = std::mem::take(&mut self.records);
        let mut next = HashMap::with_capacity(items.len());
        let mut report = CheckReport {
            checked: items.len(),
            ..Default::default()
        };

        let result = self
            .evaluate_all(&items, &mut previous, &mut next, &mut report)
            .await;

        if result.is_err() {
            // Keep what was known about items not reached this time
            next.extend(previous);
        } else {
            let max_attempts = self.config.max_repair_attempts;
            next.extend(
                previous
                    .into_iter()
                    .filter_map(|(id, tracked)| Some((id, tracked.into_terminal(max_attempts)?))),
            );
        }
        self.records = next;
        result?;

        if report.changed() {
            info!(
                repaired = report.repaired.len(),
                deleted = report.deleted.len(),
                "Health check changed items"
            );
            self.notifier.notify(&ChangeEvent::HealthChanged {
                repaired: report.repaired.clone(),
                deleted: report.deleted.clone(),
            });
        }
        if !report.flagged.is_empty() {
            self.notifier.notify(&ChangeEvent::ItemUnhealthy {
                ids: report.flagged.clone(),
            });
        }

        report.summary = self.summary();
        debug!(
            checked = report.checked,
            healthy = report.summary.healthy,
            unhealthy = report.summary.unhealthy,
            "Health check complete"
        );
        Ok(report)
    }

    async fn evaluate_all(
        &self,
        items: &[RemoteItem],
        previous: &mut HashMap<String, Tracked>,
        next: &mut HashMap<String, Tracked>,
        report: &mut CheckReport,
    ) -> Result<(), HealthError> {
        let now = Utc::now();
        for item in items {
            let mut tracked = previous
                .remove(&item.id)
                .unwrap_or_else(|| Tracked::new(item));
            tracked.record.name = item.name.clone();
            tracked.record.last_checked = now;
            let before = tracked.record.status;

            let mut reason = tracked.observe(item, self.config.stall_checks);
            if reason.is_none()
                && item.status == ItemStatus::Downloaded
                && self.archive_only(&mut tracked, item).await?
            {
                reason = Some(UnhealthyReason::ArchiveOnly);
            }

            let (id, tracked) = match reason {
                None => {
                    tracked.record.status = HealthStatus::Healthy;
                    (item.id.clone(), tracked)
                }
                Some(reason) => self.handle_unhealthy(tracked, item, reason, report).await?,
            };
            if tracked.record.status.is_unhealthy() && tracked.record.status != before {
                report.flagged.push(id.clone());
            }
            next.insert(id, tracked);
        }
        Ok(())
    }

    async fn archive_only(&self, tracked: &mut Tracked, item: &RemoteItem) -> Result<bool, HealthError> {
        if let Some(known) = tracked.archive_only {
            return Ok(known);
        }
        let verdict = if item.files.is_empty() {
            match self.remote.get_item(&item.id).await {
                Ok(detail) => is_archive_only(&detail),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    debug!(item_id = %item.id, error = %e, "Item details unavailable");
                    return Ok(false);
                }
            }
        } else {
            is_archive_only(item)
        };
        tracked.archive_only = Some(verdict);
        Ok(verdict)
    }

    async fn handle_unhealthy(
        &self,
        mut tracked: Tracked,
        item: &RemoteItem,
        reason: UnhealthyReason,
        report: &mut CheckReport,
    ) -> Result<(String, Tracked), HealthError> {
        let previous_status = tracked.record.status;
        tracked.record.status = HealthStatus::Unhealthy(reason);
        if previous_status != tracked.record.status {
            warn!(item_id = %item.id, name = %item.name, reason = %reason, "Item unhealthy");
        }

        if reason == UnhealthyReason::ArchiveOnly {
            if self.config.cleanup_archives {
                match self.delete(&item.id).await {
                    Ok(()) => {
                        info!(item_id = %item.id, name = %item.name, "Deleted archive-only item");
                        tracked.record.status = HealthStatus::Deleted;
                        report.deleted.push(item.id.clone());
                    }
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => warn!(item_id = %item.id, error = %e, "Failed to delete item"),
                }
            }
            return Ok((item.id.clone(), tracked));
        }

        if !self.config.repair {
            return Ok((item.id.clone(), tracked));
        }
        if tracked.record.repair_attempts >= self.config.max_repair_attempts {
            if previous_status == HealthStatus::Repairing {
                warn!(
                    item_id = %item.id,
                    attempts = tracked.record.repair_attempts,
                    "Repair attempts exhausted, leaving item for inspection"
                );
            }
            return Ok((item.id.clone(), tracked));
        }

        if let Err(e) = self.delete(&item.id).await {
            if e.is_fatal() {
                return Err(e.into());
            }
            warn!(item_id = %item.id, error = %e, "Failed to delete item for repair");
            return Ok((item.id.clone(), tracked));
        }

        match self.remote.add_item(&item.source()).await {
            Ok(new_id) => {
                tracked.rekey(&new_id);
                info!(
                    item_id = %item.id,
                    new_id = %new_id,
                    attempt = tracked.record.repair_attempts,
                    "Re-added unhealthy item"
                );
                report.repaired.push(new_id.clone());
                Ok((new_id, tracked))
            }
            Err(e) if e.is_fatal() => Err(e.into()),
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Item deleted but re-adding it failed");
                tracked.record.status = HealthStatus::Deleted;
                report.deleted.push(item.id.clone());
                Ok((item.id.clone(), tracked))
            }
        }
    }

    /// Delete an item. An item that is already gone counts as deleted.
    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        match self.remote.delete_item(id).await {
            Ok(()) | Err(RemoteError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
        if let Some(cache) = &self.cache {
            cache.invalidate(id);
        }
        Ok(())
    }

    /// Delete every archive-only item now, regardless of configuration.
    pub async fn cleanup(&mut self) -> Result<Vec<String>, HealthError> {
        let items = self.remote.list_items().await?;
        let mut deleted = Vec::new();

        for item in items.iter().filter(|i| i.status == ItemStatus::Downloaded) {
            let detail = match self.remote.get_item(&item.id).await {
                Ok(detail) => detail,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "Skipping item");
                    continue;
                }
            };
            if !is_archive_only(&detail) {
                continue;
            }
            match self.delete(&item.id).await {
                Ok(()) => {
                    info!(item_id = %item.id, name = %item.name, "Deleted archive-only item");
                    if let Some(tracked) = self.records.get_mut(&item.id) {
                        tracked.record.status = HealthStatus::Deleted;
                    }
                    deleted.push(item.id.clone());
                }
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => warn!(item_id = %item.id, error = %e, "Failed to delete item"),
            }
        }

        if !deleted.is_empty() {
            self.notifier.notify(&ChangeEvent::HealthChanged {
                repaired: Vec::new(),
                deleted: deleted.clone(),
            });
        }
        Ok(deleted)
    }

    /// Records from the last check, ordered by item id.
    pub fn records(&self) -> Vec<HealthRecord> {
        let mut records: Vec<HealthRecord> =
            self.records.values().map(|t| t.record.clone()).collect();
        records.sort_by(|a, b| a.item_id.cmp(&b.item_id));
        records
    }

    pub fn unhealthy(&self) -> Vec<HealthRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.status.is_unhealthy())
            .collect()
    }

    pub fn summary(&self) -> HealthSummary {
        let mut summary = HealthSummary::default();
        for record in self.records() {
            match record.status {
                HealthStatus::Healthy => summary.healthy += 1,
                HealthStatus::Unhealthy(_) => {
                    summary.unhealthy += 1;
                    summary.unhealthy_items.push(record);
                }
                HealthStatus::Repairing => summary.repairing += 1,
                HealthStatus::Deleted => summary.deleted += 1,
            }
        }
        summary
    }
}
