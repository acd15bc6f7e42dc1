//! Attribute construction shared by the fuse3 adapter.

use std::time::{Duration, SystemTime};

use fuse3::raw::reply::FileAttr;
use fuse3::FileType;

use crate::cache::VirtualNode;

/// Time-to-live for kernel attribute and entry caching.
pub const TTL: Duration = Duration::from_secs(1);

/// Block size reported for every entry.
pub const BLOCK_SIZE: u32 = 4096;

/// Builds [`FileAttr`] values for virtual entries.
///
/// Files are read-only (`0o444`) and directories `0o555`, owned by the
/// mounting user.
pub trait FileAttrBuilder {
    /// Attributes for a cached node.
    fn node_attr(&self, ino: u64, node: &VirtualNode) -> FileAttr {
        if node.is_dir() {
            dir_attr(ino, node.populated_at)
        } else {
            let mtime = node.populated_at.into();
            FileAttr {
                ino,
                size: node.size,
                blocks: node.size.div_ceil(512),
                atime: mtime,
                mtime,
                ctime: mtime,
                kind: FileType::RegularFile,
                perm: 0o444,
                nlink: 1,
                uid: unsafe { libc::getuid() },
                gid: unsafe { libc::getgid() },
                rdev: 0,
                blksize: BLOCK_SIZE,
            }
        }
    }

    /// Attributes for the mount root.
    fn root_dir_attr(&self) -> FileAttr {
        dir_attr(1, SystemTime::now())
    }
}

fn dir_attr(ino: u64, mtime: SystemTime) -> FileAttr {
    let mtime = mtime.into();
    FileAttr {
        ino,
        size: u64::from(BLOCK_SIZE),
        blocks: 1,
        atime: mtime,
        mtime,
        ctime: mtime,
        kind: FileType::Directory,
        perm: 0o555,
        nlink: 2,
        uid: unsafe { libc::getuid() },
        gid: unsafe { libc::getgid() },
        rdev: 0,
        blksize: BLOCK_SIZE,
    }
}

/// Directory entry kind for a node.
pub fn file_type(node: &VirtualNode) -> FileType {
    if node.is_dir() {
        FileType::Directory
    } else {
        FileType::RegularFile
    }
}
