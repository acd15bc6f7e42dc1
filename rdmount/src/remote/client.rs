//! Typed remote API operations.
//!
//! [`RemoteApi`] is the seam every component depends on; [`DebridClient`]
//! implements it over any [`HttpTransport`]. API calls go through the shared
//! [`RateLimiter`] and the retry policy. Byte-range fetches for file
//! content do not: they hit the download hosts rather than the API, are
//! issued exactly once, and let the filesystem decide what to do on failure.

use bytes::Bytes;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::error::RemoteError;
use super::http::{HttpRequest, HttpResponse, HttpTransport, Method};
use super::limiter::RateLimiter;
use super::retry::{with_retry, RetryPolicy};
use super::types::{FileRef, Link, RemoteItem, SourceDescriptor, UserInfo};
use super::wire::{
    error_detail, WireAdded, WireTorrent, WireTorrentInfo, WireUnrestricted, WireUser,
};

/// Page size used when listing items.
const LIST_PAGE_SIZE: usize = 100;

/// Remote API operations shared by the mount, resolver and health monitor.
pub trait RemoteApi: Send + Sync {
    /// Account details; also used to verify the token at startup.
    fn user_info(&self) -> BoxFuture<'_, Result<UserInfo, RemoteError>>;

    /// Every item on the account, without per-file detail.
    fn list_items(&self) -> BoxFuture<'_, Result<Vec<RemoteItem>, RemoteError>>;

    /// One item including its files.
    fn get_item<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<RemoteItem, RemoteError>>;

    /// Turn a file's hoster link into a direct download link.
    fn resolve_link<'a>(&'a self, file: &'a FileRef) -> BoxFuture<'a, Result<Link, RemoteError>>;

    /// Add an item from its source and select all files. Returns the new id.
    fn add_item<'a>(
        &'a self,
        source: &'a SourceDescriptor,
    ) -> BoxFuture<'a, Result<String, RemoteError>>;

    fn delete_item<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RemoteError>>;

    /// Fetch `length` bytes at `offset` with a single range request.
    ///
    /// Returns fewer bytes (possibly none) at end of file.
    fn fetch_range<'a>(
        &'a self,
        link: &'a Link,
        offset: u64,
        length: u64,
    ) -> BoxFuture<'a, Result<Bytes, RemoteError>>;
}

/// Client for the debrid REST API.
pub struct DebridClient<T: HttpTransport> {
    transport: T,
    limiter: Arc<RateLimiter>,
    base_url: String,
    token: String,
    retry: RetryPolicy,
    link_ttl: Duration,
    default_pause: Duration,
}

impl<T: HttpTransport> DebridClient<T> {
    /// Create a client sharing `limiter` with every other consumer.
    pub fn new(transport: T, limiter: Arc<RateLimiter>, base_url: &str, token: &str) -> Self {
        Self {
            transport,
            limiter,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            retry: RetryPolicy::default(),
            link_ttl: Duration::from_secs(crate::config::DEFAULT_LINK_TTL_SECS),
            default_pause: Duration::from_secs(crate::config::DEFAULT_RATE_LIMIT_PAUSE_SECS),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Lifetime assigned to resolved links.
    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    /// Pause applied when a 429 carries no Retry-After.
    pub fn with_default_pause(mut self, pause: Duration) -> Self {
        self.default_pause = pause;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send an API request with limiting and retry; return the success body.
    async fn call(
        &self,
        operation: &str,
        build: impl Fn() -> HttpRequest,
    ) -> Result<Bytes, RemoteError> {
        with_retry(&self.retry, &self.limiter, operation, || {
            let request = build().bearer(&self.token);
            async move {
                let response = self.transport.execute(request).await?;
                self.check(response)
            }
        })
        .await
    }

    async fn call_json<R: DeserializeOwned>(
        &self,
        operation: &str,
        build: impl Fn() -> HttpRequest,
    ) -> Result<R, RemoteError> {
        let body = self.call(operation, build).await?;
        serde_json::from_slice(&body)
            .map_err(|e| RemoteError::InvalidResponse(format!("{}: {}", operation, e)))
    }

    fn check(&self, response: HttpResponse) -> Result<Bytes, RemoteError> {
        if response.is_success() {
            return Ok(response.body);
        }
        Err(RemoteError::from_status(
            response.status,
            response.retry_after,
            self.default_pause,
            &error_detail(&response.body),
        ))
    }

    async fn list_all(&self) -> Result<Vec<RemoteItem>, RemoteError> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let url = self.url(&format!("/torrents?page={}&limit={}", page, LIST_PAGE_SIZE));
            let body = self
                .call("list_items", || HttpRequest::new(Method::Get, url.clone()))
                .await?;
            // 204 marks the end of the listing
            if body.is_empty() {
                break;
            }
            let batch: Vec<WireTorrent> = serde_json::from_slice(&body)
                .map_err(|e| RemoteError::InvalidResponse(format!("list_items: {}", e)))?;
            let count = batch.len();
            items.extend(batch.into_iter().map(RemoteItem::from));
            if count < LIST_PAGE_SIZE {
                break;
            }
            page += 1;
        }
        debug!(count = items.len(), "Listed remote items");
        Ok(items)
    }

    async fn add(&self, source: &SourceDescriptor) -> Result<String, RemoteError> {
        let SourceDescriptor::Magnet(magnet) = source;
        let added: WireAdded = self
            .call_json("add_item", || {
                HttpRequest::new(Method::Post, self.url("/torrents/addMagnet")).form("magnet", magnet)
            })
            .await?;

        let select_url = self.url(&format!("/torrents/selectFiles/{}", added.id));
        match self
            .call("select_files", || {
                HttpRequest::new(Method::Post, select_url.clone()).form("files", "all")
            })
            .await
        {
            Ok(_) => {}
            Err(RemoteError::Unauthorized) => return Err(RemoteError::Unauthorized),
            // Selection fails while the magnet is still converting; the item
            // then shows up as needs-selection on the next health check.
            Err(e) => warn!(item_id = %added.id, error = %e, "File selection failed"),
        }

        info!(item_id = %added.id, "Added remote item");
        Ok(added.id)
    }

    async fn range(&self, link: &Link, offset: u64, length: u64) -> Result<Bytes, RemoteError> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        if let Some(size) = link.size {
            if offset >= size {
                return Ok(Bytes::new());
            }
        }

        let last = offset.saturating_add(length - 1);
        let request = HttpRequest::new(Method::Get, link.url.clone()).range(offset, last);
        let started = Instant::now();
        let response = self.transport.execute(request).await?;

        let data = match response.status {
            206 => response.body.slice(..response.body.len().min(length as usize)),
            // Range ignored: the body is the whole file.
            200 => {
                let len = response.body.len() as u64;
                let start = offset.min(len) as usize;
                let end = offset.saturating_add(length).min(len) as usize;
                response.body.slice(start..end)
            }
            416 => Bytes::new(),
            403 | 404 | 410 => return Err(RemoteError::LinkExpired),
            429 => {
                return Err(RemoteError::RateLimited {
                    retry_after: response.retry_after.unwrap_or(self.default_pause),
                })
            }
            status => {
                return Err(RemoteError::Transient(format!(
                    "HTTP {} fetching range",
                    status
                )))
            }
        };

        debug!(
            offset,
            requested = length,
            received = data.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Range fetched"
        );
        Ok(data)
    }
}

impl<T: HttpTransport + 'static> RemoteApi for DebridClient<T> {
    fn user_info(&self) -> BoxFuture<'_, Result<UserInfo, RemoteError>> {
        Box::pin(async move {
            let user: WireUser = self
                .call_json("user_info", || HttpRequest::new(Method::Get, self.url("/user")))
                .await?;
            Ok(user.into())
        })
    }

    fn list_items(&self) -> BoxFuture<'_, Result<Vec<RemoteItem>, RemoteError>> {
        Box::pin(self.list_all())
    }

    fn get_item<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<RemoteItem, RemoteError>> {
        Box::pin(async move {
            let url = self.url(&format!("/torrents/info/{}", id));
            let info: WireTorrentInfo = self
                .call_json("get_item", || HttpRequest::new(Method::Get, url.clone()))
                .await?;
            Ok(info.into())
        })
    }

    fn resolve_link<'a>(&'a self, file: &'a FileRef) -> BoxFuture<'a, Result<Link, RemoteError>> {
        Box::pin(async move {
            let resolved: WireUnrestricted = self
                .call_json("resolve_link", || {
                    HttpRequest::new(Method::Post, self.url("/unrestrict/link"))
                        .form("link", &file.hoster_link)
                })
                .await?;
            debug!(item_id = %file.item_id, file_id = file.file_id, "Resolved download link");
            Ok(Link {
                url: resolved.download,
                issued_at: Instant::now(),
                ttl: self.link_ttl,
                size: resolved.filesize,
            })
        })
    }

    fn add_item<'a>(
        &'a self,
        source: &'a SourceDescriptor,
    ) -> BoxFuture<'a, Result<String, RemoteError>> {
        Box::pin(self.add(source))
    }

    fn delete_item<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(async move {
            let url = self.url(&format!("/torrents/delete/{}", id));
            self.call("delete_item", || HttpRequest::new(Method::Delete, url.clone()))
                .await?;
            info!(item_id = %id, "Deleted remote item");
            Ok(())
        })
    }

    fn fetch_range<'a>(
        &'a self,
        link: &'a Link,
        offset: u64,
        length: u64,
    ) -> BoxFuture<'a, Result<Bytes, RemoteError>> {
        Box::pin(self.range(link, offset, length))
    }
}
