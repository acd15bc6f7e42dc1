//! Async multi-threaded kernel adapter using fuse3.
//!
//! ```text
//! media player                Tokio runtime (multi-threaded)
//!    │                              │
//!    ├── read(a.mkv, 0) ───────────►├── task ──► VirtualFs::read ──► range GET
//!    ├── read(a.mkv, 128K) ────────►├── task ──► VirtualFs::read ──► range GET
//!    ├── readdir(/) ───────────────►├── task ──► MetadataCache::list_root
//!    │◄── responses ────────────────┤
//! ```
//!
//! The session is mounted read-only, so the kernel rejects writes with
//! `EROFS` before they reach the adapter.

mod filesystem;
mod inode;
mod shared;
mod types;

pub use filesystem::Fuse3DebridFS;
pub use inode::{InodeManager, ROOT_INODE};
pub use shared::{FileAttrBuilder, TTL};
pub use types::{fusermount_unmount, is_mounted, Fuse3Error, Fuse3Result, SpawnedMountHandle};
