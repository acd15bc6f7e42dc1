use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::fuse::FsError;

/// Errors that abort a resolver cycle.
///
/// A cycle that fails never removes anything from the organized library.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{} is not mounted", .0.display())]
    NotMounted(PathBuf),

    #[error("failed to scan {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: FsError,
    },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ResolveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the loop should stop instead of retrying next cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Scan {
                source: FsError::PermissionDenied(_),
                ..
            }
        )
    }
}
