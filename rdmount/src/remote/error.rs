//! Error taxonomy for remote API calls.

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the remote client.
///
/// The type is `Clone` so a single in-flight result can be handed to every
/// caller coalesced onto it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The token was rejected. Fatal, never retried.
    #[error("authentication rejected by the remote service (check remote.api_token)")]
    Unauthorized,

    /// The remote asked us to slow down.
    #[error("rate limited by the remote service, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// Network failure, timeout or 5xx.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// The item or file no longer exists remotely.
    #[error("not found: {0}")]
    NotFound(String),

    /// The remote refused the request as malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A download link was refused while fetching bytes.
    #[error("download link expired or revoked")]
    LinkExpired,
}

impl RemoteError {
    /// Whether a bounded retry with backoff may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether the error ends the calling component.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Map a non-success API status code to an error.
    ///
    /// `default_pause` is used for 429 responses without a Retry-After header.
    pub fn from_status(
        status: u16,
        retry_after: Option<Duration>,
        default_pause: Duration,
        detail: &str,
    ) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 => Self::NotFound(detail.to_string()),
            400 | 422 => Self::InvalidInput(detail.to_string()),
            429 => Self::RateLimited {
                retry_after: retry_after.unwrap_or(default_pause),
            },
            _ => Self::Transient(format!("HTTP {}: {}", status, detail)),
        }
    }
}
