//! Client for the debrid service's REST API.
//!
//! # Architecture
//!
//! ```text
//! MetadataCache ─┐
//! HealthMonitor ─┼──► Arc<dyn RemoteApi> ──► DebridClient ──► HttpTransport
//! Resolver (CLI)─┘            │                   │
//!                             │                   └── RateLimiter (one per process)
//!                             └── fetch_range: single range GET, no limiter
//! ```
//!
//! Failures are classified into [`RemoteError`]: `Unauthorized` is fatal,
//! `RateLimited` pauses the shared limiter for every caller, `Transient`
//! is retried with jittered exponential backoff.

mod client;
mod error;
mod http;
mod limiter;
mod retry;
mod types;
mod wire;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{DebridClient, RemoteApi};
pub use error::RemoteError;
pub use http::{HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use limiter::RateLimiter;
pub use retry::{with_retry, RetryPolicy, DEFAULT_MAX_RATE_LIMIT_WAITS};
pub use types::{FileRef, ItemStatus, Link, RemoteFile, RemoteItem, SourceDescriptor, UserInfo};

use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigFile;

/// Build the production client from configuration.
///
/// The returned limiter is the one instance shared by every consumer.
pub fn client_from_config(config: &ConfigFile) -> Result<Arc<dyn RemoteApi>, RemoteError> {
    let remote = &config.remote;
    let transport = ReqwestTransport::new(Duration::from_secs(remote.request_timeout))?;
    let limiter = Arc::new(RateLimiter::new(remote.requests_per_minute, remote.burst));
    let client = DebridClient::new(transport, limiter, &remote.api_url, remote.api_token.trim())
        .with_retry_policy(RetryPolicy {
            max_retries: remote.max_retries,
            base_delay: Duration::from_millis(remote.retry_base_delay_ms),
            max_delay: Duration::from_millis(remote.retry_max_delay_ms),
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
        })
        .with_link_ttl(config.mount.link_ttl())
        .with_default_pause(Duration::from_secs(remote.rate_limit_pause));
    Ok(Arc::new(client))
}
