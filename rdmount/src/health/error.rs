use thiserror::Error;

use crate::remote::RemoteError;

/// Errors that abort a health check.
///
/// Failures on a single item are logged and leave that item for the next
/// check; only listing failures surface here.
#[derive(Debug, Error)]
pub enum HealthError {
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl HealthError {
    /// Whether the loop should stop instead of retrying next check.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_fatal(),
        }
    }
}
