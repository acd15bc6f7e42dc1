//! Read-only virtual filesystem over the remote library.
//!
//! - [`VirtualFs`] is the path-based call surface (`list`, `stat`, `open`,
//!   `read`, `release`, `readlink`) and owns the open-file arena.
//! - [`Fuse3DebridFS`] adapts it to the kernel through fuse3.

mod driver;
mod error;
pub mod fuse3;
mod handles;

pub use self::fuse3::{Fuse3DebridFS, Fuse3Error, SpawnedMountHandle};
pub use driver::VirtualFs;
pub use error::FsError;
pub use handles::{FileHandle, HandleTable};
