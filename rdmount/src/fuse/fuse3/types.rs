//! Mount errors and the background mount handle.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub type Fuse3Result<T> = Result<T, Fuse3Error>;

/// Errors raised while mounting.
#[derive(Debug, Error)]
pub enum Fuse3Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Mount failed: {0}")]
    MountFailed(String),

    #[error("Mountpoint {} is busy (already mounted?)", .0.display())]
    Busy(PathBuf),

    #[error("Invalid mountpoint: {0}")]
    InvalidPath(String),
}

/// Handle to a filesystem session running on a spawned task.
///
/// Dropping the handle without calling [`unmount`](Self::unmount) falls
/// back to `fusermount3 -u`.
pub struct SpawnedMountHandle {
    task: Option<JoinHandle<io::Result<()>>>,
    unmount_tx: Option<oneshot::Sender<()>>,
    mountpoint: PathBuf,
}

impl SpawnedMountHandle {
    pub(crate) fn new(
        task: JoinHandle<io::Result<()>>,
        unmount_tx: oneshot::Sender<()>,
        mountpoint: PathBuf,
    ) -> Self {
        Self {
            task: Some(task),
            unmount_tx: Some(unmount_tx),
            mountpoint,
        }
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    /// Resolves when the session ends, e.g. after an external
    /// `fusermount -u`.
    pub async fn wait(&mut self) -> io::Result<()> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(io::Error::other(format!("Mount task panicked: {}", e))),
        };
        self.task = None;
        self.unmount_tx = None;
        result
    }

    /// Signal the session to unmount and wait for it.
    pub async fn unmount(mut self) -> io::Result<()> {
        if let Some(tx) = self.unmount_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result,
                Err(e) => Err(io::Error::other(format!("Mount task panicked: {}", e))),
            }
        } else {
            Ok(())
        }
    }

    /// Unmount with `fusermount` when no async context is available.
    pub fn unmount_sync(&mut self) {
        if let Some(tx) = self.unmount_tx.take() {
            let _ = tx.send(());
        }

        if is_mounted(&self.mountpoint) {
            fusermount_unmount(&self.mountpoint);
        } else {
            debug!(mountpoint = %self.mountpoint.display(), "Already unmounted, skipping fusermount");
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SpawnedMountHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.unmount_sync();
        }
    }
}

/// Whether `path` appears as a mountpoint in `/proc/mounts`.
pub fn is_mounted(path: &Path) -> bool {
    let Ok(mounts) = std::fs::read_to_string("/proc/mounts") else {
        return false;
    };
    let path_str = path.to_string_lossy();
    mounts.lines().any(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        parts.len() >= 2 && parts[1] == path_str
    })
}

/// Run `fusermount3 -u`, falling back to `fusermount -u`.
///
/// Returns whether the unmount succeeded.
pub fn fusermount_unmount(mountpoint: &Path) -> bool {
    let mountpoint_str = mountpoint.to_string_lossy();
    let result = Command::new("fusermount3")
        .args(["-u", &mountpoint_str])
        .output()
        .or_else(|_| {
            Command::new("fusermount")
                .args(["-u", &mountpoint_str])
                .output()
        });

    match result {
        Ok(output) if output.status.success() => true,
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("not found") && !stderr.contains("not mounted") {
                warn!(mountpoint = %mountpoint_str, stderr = %stderr, "fusermount -u failed");
            }
            false
        }
        Err(e) => {
            warn!(mountpoint = %mountpoint_str, error = %e, "Failed to run fusermount");
            false
        }
    }
}
