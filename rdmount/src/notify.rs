//! Change notifications fired by the resolver and health monitor.
//!
//! Each loop fires an event kind at most once per cycle and only when
//! something changed. What the subscriber does is not our
//! concern; [`CommandHook`] runs a shell command and returns immediately.

use serde::Serialize;
use std::process::{Command, Stdio};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What changed during one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// The organized library gained, moved or lost entries.
    LibraryUpdated {
        linked: usize,
        relinked: usize,
        removed: usize,
    },
    /// Items were repaired or deleted. Values are item ids.
    HealthChanged {
        repaired: Vec<String>,
        deleted: Vec<String>,
    },
    /// Items turned unhealthy and were left that way: no repair was
    /// attempted or none is left.
    ItemUnhealthy { ids: Vec<String> },
}

impl ChangeEvent {
    /// Short event name used in hook templates.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LibraryUpdated { .. } => "library_updated",
            Self::HealthChanged { .. } => "health_changed",
            Self::ItemUnhealthy { .. } => "item_unhealthy",
        }
    }

    /// Number of changes carried by the event.
    pub fn count(&self) -> usize {
        match self {
            Self::LibraryUpdated {
                linked,
                relinked,
                removed,
            } => linked + relinked + removed,
            Self::HealthChanged { repaired, deleted } => repaired.len() + deleted.len(),
            Self::ItemUnhealthy { ids } => ids.len(),
        }
    }
}

/// Synchronous change callback.
pub trait ChangeNotifier: Send + Sync {
    fn notify(&self, event: &ChangeEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn notify(&self, event: &ChangeEvent) {
        debug!(event = event.name(), "No change hook configured");
    }
}

/// Runs a shell command per event.
///
/// `{{event}}` and `{{count}}` in the command are replaced before it runs.
/// The child is not awaited by the caller.
#[derive(Debug, Clone)]
pub struct CommandHook {
    command: String,
}

impl CommandHook {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Expand template variables for an event.
    pub fn render(&self, event: &ChangeEvent) -> String {
        self.command
            .replace("{{event}}", event.name())
            .replace("{{count}}", &event.count().to_string())
    }
}

impl ChangeNotifier for CommandHook {
    fn notify(&self, event: &ChangeEvent) {
        let command = self.render(event);
        let spawned = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        match spawned {
            Ok(mut child) => {
                info!(event = event.name(), pid = child.id(), "Change hook started");
                // Reap in the background so the hook never leaves a zombie
                std::thread::spawn(move || {
                    if let Err(e) = child.wait() {
                        warn!(error = %e, "Failed waiting for change hook");
                    }
                });
            }
            Err(e) => warn!(command = %command, error = %e, "Failed to start change hook"),
        }
    }
}

/// Notifier for an optional configured command.
pub fn notifier_for(command: Option<&str>) -> Arc<dyn ChangeNotifier> {
    match command.map(str::trim).filter(|c| !c.is_empty()) {
        Some(command) => Arc::new(CommandHook::new(command)),
        None => Arc::new(NoopNotifier),
    }
}
