//! Sources of video files for the resolver.

use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use super::error::ResolveError;
use crate::fuse::fuse3::is_mounted;
use crate::fuse::{FsError, VirtualFs};
use crate::media::is_video;

/// A video file found under the mount root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Owning item: its id when known, else its directory name.
    pub item: String,
    /// Name of the item directory in the mount root.
    pub item_dir: String,
    pub file_name: String,
    /// Absolute path under the mount root; the symlink target.
    pub path: PathBuf,
}

/// Lists the video files currently visible in the mount.
pub trait SourceScanner: Send + Sync {
    /// Absolute path of the mount root.
    fn mount_root(&self) -> &Path;

    /// Every video file in the mount. Any failure aborts the scan.
    fn scan(&self) -> BoxFuture<'_, Result<Vec<SourceFile>, ResolveError>>;
}

/// Walks a mounted directory, for running the resolver apart from the
/// mount process.
pub struct MountScanner {
    root: PathBuf,
    require_mounted: bool,
}

impl MountScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            require_mounted: true,
        }
    }

    /// Whether to refuse scanning a directory that is not a mountpoint.
    ///
    /// An unmounted mountpoint is an empty directory, which would make
    /// every organized entry look stale.
    pub fn with_require_mounted(mut self, require: bool) -> Self {
        self.require_mounted = require;
        self
    }

    async fn walk(&self) -> Result<Vec<SourceFile>, ResolveError> {
        if self.require_mounted && !is_mounted(&self.root) {
            return Err(ResolveError::NotMounted(self.root.clone()));
        }

        let mut files = Vec::new();
        let mut items = fs::read_dir(&self.root)
            .await
            .map_err(|e| ResolveError::io(&self.root, e))?;

        while let Some(item) = items
            .next_entry()
            .await
            .map_err(|e| ResolveError::io(&self.root, e))?
        {
            let is_dir = item
                .file_type()
                .await
                .map(|t| t.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            let item_dir = item.file_name().to_string_lossy().into_owned();

            let mut stack = vec![item.path()];
            while let Some(dir) = stack.pop() {
                let mut entries = fs::read_dir(&dir)
                    .await
                    .map_err(|e| ResolveError::io(&dir, e))?;
                while let Some(entry) = entries
                    .next_entry()
                    .await
                    .map_err(|e| ResolveError::io(&dir, e))?
                {
                    let file_type = entry
                        .file_type()
                        .await
                        .map_err(|e| ResolveError::io(entry.path(), e))?;
                    let name = entry.file_name().to_string_lossy().into_owned();
                    if file_type.is_dir() {
                        stack.push(entry.path());
                    } else if file_type.is_file() && is_video(&name) {
                        files.push(SourceFile {
                            item: item_dir.clone(),
                            item_dir: item_dir.clone(),
                            file_name: name,
                            path: entry.path(),
                        });
                    }
                }
            }
        }

        Ok(files)
    }
}

impl SourceScanner for MountScanner {
    fn mount_root(&self) -> &Path {
        &self.root
    }

    fn scan(&self) -> BoxFuture<'_, Result<Vec<SourceFile>, ResolveError>> {
        Box::pin(self.walk())
    }
}

/// Walks the in-process [`VirtualFs`], for the resolver loop that runs
/// inside the mount service.
pub struct DriverScanner {
    fs: Arc<VirtualFs>,
    mount_root: PathBuf,
}

impl DriverScanner {
    pub fn new(fs: Arc<VirtualFs>, mount_root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            mount_root: mount_root.into(),
        }
    }

    async fn walk(&self) -> Result<Vec<SourceFile>, ResolveError> {
        let scan_err = |path: &str, source: FsError| ResolveError::Scan {
            path: path.to_string(),
            source,
        };

        let mut files = Vec::new();
        for item in self.fs.list("").await.map_err(|e| scan_err("/", e))? {
            let mut stack = vec![item.path.clone()];
            while let Some(dir) = stack.pop() {
                let children = match self.fs.list(&dir).await {
                    Ok(children) => children,
                    Err(FsError::NotFound(_)) => {
                        debug!(path = %dir, "Directory vanished during scan");
                        continue;
                    }
                    Err(e) => return Err(scan_err(&dir, e)),
                };
                for child in children {
                    if child.is_dir() {
                        stack.push(child.path);
                    } else if is_video(&child.name) {
                        files.push(SourceFile {
                            item: child.item_id.clone(),
                            item_dir: item.name.clone(),
                            path: self.mount_root.join(&child.path),
                            file_name: child.name,
                        });
                    }
                }
            }
        }
        Ok(files)
    }
}

impl SourceScanner for DriverScanner {
    fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    fn scan(&self) -> BoxFuture<'_, Result<Vec<SourceFile>, ResolveError>> {
        Box::pin(self.walk())
    }
}
