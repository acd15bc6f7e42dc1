//! Driver errors and their errno mapping.

use thiserror::Error;

use crate::cache::CacheError;
use crate::remote::RemoteError;

/// Errors returned by [`VirtualFs`](super::VirtualFs) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("invalid argument")]
    InvalidArgument,

    #[error("unknown file handle {0}")]
    BadHandle(u64),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("read timed out after {0}s")]
    TimedOut(u64),

    /// Transient failure of a single operation.
    #[error("I/O error: {0}")]
    Io(String),
}

impl FsError {
    /// errno reported to the kernel.
    pub fn errno(&self) -> i32 {
        match self {
            Self::NotFound(_) => libc::ENOENT,
            Self::NotADirectory(_) => libc::ENOTDIR,
            Self::IsADirectory(_) => libc::EISDIR,
            Self::InvalidArgument => libc::EINVAL,
            Self::BadHandle(_) => libc::EBADF,
            Self::PermissionDenied(_) => libc::EACCES,
            Self::TimedOut(_) => libc::ETIMEDOUT,
            Self::Io(_) => libc::EIO,
        }
    }
}

impl From<CacheError> for FsError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::NotFound(path) => Self::NotFound(path),
            CacheError::NotADirectory(path) => Self::NotADirectory(path),
            CacheError::Remote(remote) => remote.into(),
        }
    }
}

impl From<RemoteError> for FsError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(what) => Self::NotFound(what),
            RemoteError::Unauthorized => Self::PermissionDenied(err.to_string()),
            other => Self::Io(other.to_string()),
        }
    }
}
