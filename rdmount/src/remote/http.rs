//! HTTP transport abstraction for testability.

use bytes::Bytes;
use std::future::Future;
use std::time::Duration;
use tracing::{trace, warn};

use super::error::RemoteError;

/// HTTP method used by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Delete,
}

/// A single HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub form: Vec<(String, String)>,
    /// Inclusive byte range `(first, last)`.
    pub range: Option<(u64, u64)>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            bearer: None,
            form: Vec::new(),
            range: None,
        }
    }

    pub fn bearer(mut self, token: &str) -> Self {
        self.bearer = Some(token.to_string());
        self
    }

    pub fn form(mut self, key: &str, value: &str) -> Self {
        self.form.push((key.to_string(), value.to_string()));
        self
    }

    pub fn range(mut self, first: u64, last: u64) -> Self {
        self.range = Some((first, last));
        self
    }
}

/// Response of a single HTTP exchange.
///
/// Non-success statuses are returned as values; classifying them is the
/// caller's job.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for performing HTTP exchanges.
///
/// Implementations only fail for transport problems (connect, timeout,
/// truncated body), which surface as [`RemoteError::Transient`].
pub trait HttpTransport: Send + Sync {
    fn execute(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, RemoteError>> + Send;
}

/// Default User-Agent string for HTTP requests.
const DEFAULT_USER_AGENT: &str = concat!("rdmount/", env!("CARGO_PKG_VERSION"));

/// Real HTTP transport implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given request timeout.
    ///
    /// Connections are pooled and kept warm since the mount issues many
    /// small range requests against the same download hosts.
    pub fn new(timeout: Duration) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .pool_max_idle_per_host(32)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| RemoteError::Transient(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, RemoteError> {
        trace!(url = %request.url, method = ?request.method, "HTTP request starting");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        if let Some((first, last)) = request.range {
            builder = builder.header(reqwest::header::RANGE, format!("bytes={}-{}", first, last));
        }

        let response = builder.send().await.map_err(|e| {
            warn!(
                url = %request.url,
                error = %e,
                is_connect = e.is_connect(),
                is_timeout = e.is_timeout(),
                "HTTP request failed"
            );
            RemoteError::Transient(format!("Request failed: {}", e))
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transient(format!("Failed to read response: {}", e)))?;

        trace!(status, bytes = body.len(), "HTTP response received");

        Ok(HttpResponse {
            status,
            retry_after,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted transport returning queued responses in order and recording
    /// every request it saw.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<HttpResponse, RemoteError>>>,
        pub(crate) requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn push(&self, response: Result<HttpResponse, RemoteError>) {
            self.responses.lock().push_back(response);
        }

        pub(crate) fn push_json(&self, status: u16, body: &str) {
            self.push(Ok(HttpResponse::new(status, body.to_string())));
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl HttpTransport for ScriptedTransport {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, RemoteError> {
            self.requests.lock().push(request);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(RemoteError::Transient("no scripted response".into())))
        }
    }

    #[test]
    fn test_request_builder() {
        let req = HttpRequest::new(Method::Post, "https://api/unrestrict/link")
            .bearer("tok")
            .form("link", "https://host/file");

        assert_eq!(req.method, Method::Post);
        assert_eq!(req.bearer.as_deref(), Some("tok"));
        assert_eq!(req.form, vec![("link".to_string(), "https://host/file".to_string())]);
        assert!(req.range.is_none());
    }

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "").is_success());
        assert!(HttpResponse::new(204, "").is_success());
        assert!(HttpResponse::new(206, "").is_success());
        assert!(!HttpResponse::new(302, "").is_success());
        assert!(!HttpResponse::new(404, "").is_success());
    }

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }
}
