//! Kernel adapter over [`VirtualFs`].
//!
//! Translates inode-based fuse3 callbacks into path-based driver calls.
//! Every callback runs as its own task on the Tokio runtime, so many
//! reads can be in flight at once.

use super::inode::{InodeManager, ROOT_INODE};
use super::shared::{file_type, FileAttrBuilder, TTL};
use super::types::{is_mounted, Fuse3Error, Fuse3Result, SpawnedMountHandle};
use crate::cache::join_path;
use crate::fuse::{FsError, VirtualFs};
use bytes::Bytes;
use fuse3::raw::prelude::*;
use fuse3::raw::reply::{
    DirectoryEntry, DirectoryEntryPlus, ReplyAttr, ReplyData, ReplyDirectory, ReplyEntry,
    ReplyInit, ReplyOpen, ReplyStatFs,
};
use fuse3::raw::Filesystem;
use fuse3::{Errno, MountOptions, Result as Fuse3InternalResult};
use futures::stream::{self, BoxStream, StreamExt};
use std::ffi::{OsStr, OsString};
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, trace};

const MAX_WRITE: u32 = 1024 * 1024;

fn errno(err: FsError) -> Errno {
    Errno::from(err.errno())
}

/// fuse3 filesystem serving the remote library read-only.
pub struct Fuse3DebridFS {
    fs: Arc<VirtualFs>,
    inodes: InodeManager,
    allow_other: bool,
}

impl Fuse3DebridFS {
    pub fn new(fs: Arc<VirtualFs>) -> Self {
        Self {
            fs,
            inodes: InodeManager::new(),
            allow_other: false,
        }
    }

    /// Let users other than the mounting user see the files.
    pub fn with_allow_other(mut self, allow_other: bool) -> Self {
        self.allow_other = allow_other;
        self
    }

    fn path_of(&self, ino: u64) -> Fuse3InternalResult<String> {
        self.inodes.get_path(ino).ok_or(Errno::from(libc::ENOENT))
    }

    fn mount_options(&self) -> MountOptions {
        let mut mount_options = MountOptions::default();
        mount_options.fs_name("rdmount");
        mount_options.read_only(true);
        mount_options.force_readdir_plus(false);
        mount_options.allow_other(self.allow_other);
        mount_options
    }

    /// Mount on a spawned task and return a handle controlling it.
    ///
    /// Fails with [`Fuse3Error::Busy`] when something is already mounted
    /// at `mountpoint`.
    pub async fn mount_spawned(self, mountpoint: &Path) -> Fuse3Result<SpawnedMountHandle> {
        if !mountpoint.is_dir() {
            return Err(Fuse3Error::InvalidPath(format!(
                "{} is not a directory",
                mountpoint.display()
            )));
        }
        if is_mounted(mountpoint) {
            return Err(Fuse3Error::Busy(mountpoint.to_path_buf()));
        }

        let mount_options = self.mount_options();
        let mount_path = mountpoint.to_path_buf();
        let (unmount_tx, unmount_rx) = oneshot::channel::<()>();

        #[cfg(target_os = "linux")]
        let handle = fuse3::raw::Session::new(mount_options)
            .mount_with_unprivileged(self, mount_path.clone())
            .await
            .map_err(|e| Fuse3Error::MountFailed(e.to_string()))?;

        #[cfg(not(target_os = "linux"))]
        let handle = fuse3::raw::Session::new(mount_options)
            .mount(self, mount_path.clone())
            .await
            .map_err(|e| Fuse3Error::MountFailed(e.to_string()))?;

        info!(mountpoint = %mount_path.display(), "Filesystem mounted");

        let task = tokio::spawn(async move {
            tokio::select! {
                result = handle => result,
                // Dropping the session handle unmounts
                _ = unmount_rx => Ok(()),
            }
        });

        Ok(SpawnedMountHandle::new(task, unmount_tx, mount_path))
    }
}

impl FileAttrBuilder for Fuse3DebridFS {}

impl Filesystem for Fuse3DebridFS {
    type DirEntryStream<'a>
        = BoxStream<'a, Fuse3InternalResult<DirectoryEntry>>
    where
        Self: 'a;
    type DirEntryPlusStream<'a>
        = BoxStream<'a, Fuse3InternalResult<DirectoryEntryPlus>>
    where
        Self: 'a;

    async fn init(&self, _req: Request) -> Fuse3InternalResult<ReplyInit> {
        debug!("fuse3: init");
        Ok(ReplyInit {
            max_write: NonZeroU32::new(MAX_WRITE).unwrap_or(NonZeroU32::MIN),
        })
    }

    async fn destroy(&self, _req: Request) {
        debug!(open_handles = self.fs.open_handles(), "fuse3: destroy");
    }

    async fn lookup(
        &self,
        _req: Request,
        parent: u64,
        name: &OsStr,
    ) -> Fuse3InternalResult<ReplyEntry> {
        trace!(parent, name = ?name, "fuse3: lookup");

        let parent_path = self.path_of(parent)?;
        let child_path = join_path(&parent_path, &name.to_string_lossy());
        let node = self.fs.stat(&child_path).await.map_err(errno)?;

        let inode = self.inodes.get_or_create_inode(&child_path);
        Ok(ReplyEntry {
            ttl: TTL,
            attr: self.node_attr(inode, &node),
            generation: 0,
        })
    }

    async fn getattr(
        &self,
        _req: Request,
        ino: u64,
        _fh: Option<u64>,
        _flags: u32,
    ) -> Fuse3InternalResult<ReplyAttr> {
        trace!(ino, "fuse3: getattr");

        if ino == ROOT_INODE {
            return Ok(ReplyAttr {
                ttl: TTL,
                attr: self.root_dir_attr(),
            });
        }

        let path = self.path_of(ino)?;
        let node = self.fs.stat(&path).await.map_err(errno)?;
        Ok(ReplyAttr {
            ttl: TTL,
            attr: self.node_attr(ino, &node),
        })
    }

    async fn open(&self, _req: Request, ino: u64, flags: u32) -> Fuse3InternalResult<ReplyOpen> {
        trace!(ino, flags, "fuse3: open");

        if flags & libc::O_ACCMODE as u32 != libc::O_RDONLY as u32 {
            return Err(Errno::from(libc::EROFS));
        }
        let path = self.path_of(ino)?;
        let fh = self.fs.open(&path).await.map_err(errno)?;
        Ok(ReplyOpen { fh, flags: 0 })
    }

    async fn read(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        offset: u64,
        size: u32,
    ) -> Fuse3InternalResult<ReplyData> {
        trace!(ino, fh, offset, size, "fuse3: read");

        let data: Bytes = self.fs.read(fh, offset, size).await.map_err(errno)?;
        Ok(ReplyData { data })
    }

    async fn release(
        &self,
        _req: Request,
        ino: u64,
        fh: u64,
        _flags: u32,
        _lock_owner: u64,
        _flush: bool,
    ) -> Fuse3InternalResult<()> {
        trace!(ino, fh, "fuse3: release");
        self.fs.release(fh).map_err(errno)
    }

    async fn readlink(&self, _req: Request, ino: u64) -> Fuse3InternalResult<ReplyData> {
        let path = self.path_of(ino)?;
        let target = self.fs.readlink(&path).await.map_err(errno)?;
        Ok(ReplyData {
            data: Bytes::from(target),
        })
    }

    async fn readdir(
        &self,
        _req: Request,
        ino: u64,
        _fh: u64,
        offset: i64,
    ) -> Fuse3InternalResult<ReplyDirectory<Self::DirEntryStream<'_>>> {
        trace!(ino, offset, "fuse3: readdir");

        let path = self.path_of(ino)?;
        let children = self.fs.list(&path).await.map_err(errno)?;

        let parent_inode = if ino == ROOT_INODE {
            ROOT_INODE
        } else {
            let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
            self.inodes.get_inode(parent).unwrap_or(ROOT_INODE)
        };

        let mut entries = vec![
            DirectoryEntry {
                inode: ino,
                kind: FileType::Directory,
                name: OsString::from("."),
                offset: 1,
            },
            DirectoryEntry {
                inode: parent_inode,
                kind: FileType::Directory,
                name: OsString::from(".."),
                offset: 2,
            },
        ];

        for (idx, child) in children.iter().enumerate() {
            entries.push(DirectoryEntry {
                inode: self.inodes.get_or_create_inode(&child.path),
                kind: file_type(child),
                name: OsString::from(&child.name),
                offset: idx as i64 + 3,
            });
        }

        let entries: Vec<_> = entries
            .into_iter()
            .skip(offset.max(0) as usize)
            .map(Ok)
            .collect();

        Ok(ReplyDirectory {
            entries: stream::iter(entries).boxed(),
        })
    }

    async fn opendir(
        &self,
        _req: Request,
        ino: u64,
        _flags: u32,
    ) -> Fuse3InternalResult<ReplyOpen> {
        trace!(ino, "fuse3: opendir");
        // Stateless directory I/O
        Ok(ReplyOpen { fh: 0, flags: 0 })
    }

    async fn access(&self, _req: Request, _ino: u64, mask: u32) -> Fuse3InternalResult<()> {
        if mask & libc::W_OK as u32 != 0 {
            return Err(Errno::from(libc::EROFS));
        }
        Ok(())
    }

    async fn flush(
        &self,
        _req: Request,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
    ) -> Fuse3InternalResult<()> {
        Ok(())
    }

    async fn fsync(
        &self,
        _req: Request,
        _ino: u64,
        _fh: u64,
        _datasync: bool,
    ) -> Fuse3InternalResult<()> {
        Ok(())
    }

    async fn statfs(&self, _req: Request, _ino: u64) -> Fuse3InternalResult<ReplyStatFs> {
        Ok(ReplyStatFs {
            blocks: 0,
            bfree: 0,
            bavail: 0,
            files: self.inodes.len() as u64,
            ffree: 0,
            bsize: super::shared::BLOCK_SIZE,
            namelen: 255,
            frsize: super::shared::BLOCK_SIZE,
        })
    }
}
