//! Outbound calls to the remote hub.
//!
//! Everything that talks to the network goes through the [`Transport`] trait.
//! Layers compose by wrapping another transport:
//!
//! ```text
//! +-----------------------+     +----------------+     +---------------+
//! | AuthenticatedTransport| --> | RetryTransport | --> | HttpTransport |
//! | (bearer, logout)      |     | (backoff)      |     | (reqwest)     |
//! +-----------------------+     +----------------+     +---------------+
//! ```
//!
//! Tests swap the bottom layer for an in-process fake.

mod http;
mod pages;
mod retry;

#[cfg(test)]
pub(crate) mod fake;

pub use http::{HttpTransport, DEFAULT_ENDPOINT};
pub use pages::fetch_all;
pub use retry::{
    RetryPolicy, RetryTransport, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_DELAY_MS, DEFAULT_MAX_RETRIES,
};

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream};
use reqwest::Method;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Failures at the transport boundary, already classified by status.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Timeout, connection reset, DNS failure, broken body.
    #[error("network failure: {0}")]
    Network(String),

    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// 4xx other than 401/403.
    #[error("client error ({status}): {message}")]
    Client { status: u16, message: String },

    /// 401/403.
    #[error("authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    /// A local request body could not be read.
    #[error("local body unreadable: {0}")]
    Local(String),
}

impl TransportError {
    /// Only network failures and 5xx answers are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::Server { .. }
        )
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => TransportError::Auth { status, message },
            400..=499 => TransportError::Client { status, message },
            _ => TransportError::Server { status, message },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Network(_) | TransportError::Local(_) => None,
            TransportError::Server { status, .. }
            | TransportError::Client { status, .. }
            | TransportError::Auth { status, .. } => Some(*status),
        }
    }
}

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Path relative to the configured hub endpoint, e.g. `/api/models`.
    Hub(String),
    /// Fully qualified URL handed out by the hub (large-object upload actions).
    Absolute(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    /// Newline-delimited JSON, one value per line.
    Ndjson(Vec<serde_json::Value>),
    Bytes(Bytes),
    /// Streamed from disk on every attempt.
    File(PathBuf),
}

/// A single call against the hub, cheap to clone for retries.
#[derive(Debug, Clone)]
pub struct HubRequest {
    pub method: Method,
    pub target: Target,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
    /// Filled in by the authentication layer.
    pub bearer: Option<String>,
}

impl HubRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            target: Target::Hub(path.into()),
            query: Vec::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            bearer: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn absolute(method: Method, url: impl Into<String>) -> Self {
        Self {
            target: Target::Absolute(url.into()),
            ..Self::new(method, String::new())
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.headers.push((key.to_string(), value.into()));
        self
    }

    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    pub fn ndjson(mut self, lines: Vec<serde_json::Value>) -> Self {
        self.body = RequestBody::Ndjson(lines);
        self
    }

    pub fn bytes(mut self, data: Bytes) -> Self {
        self.body = RequestBody::Bytes(data);
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Follow-up request for an absolute `next` link on the same host.
    ///
    /// The link's path and query replace ours; method, headers and bearer
    /// are kept.
    pub fn follow(&self, link: &str) -> Option<Self> {
        let url = url::Url::parse(link).ok()?;
        let mut next = self.clone();
        next.target = Target::Hub(url.path().to_string());
        next.query = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Some(next)
    }

    /// The path component, for logging and routing.
    pub fn path(&self) -> &str {
        match &self.target {
            Target::Hub(path) => path,
            Target::Absolute(url) => url,
        }
    }
}

/// A successful (2xx) answer.
#[derive(Debug, Clone)]
pub struct HubResponse {
    pub status: u16,
    /// Lower-cased header names.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HubResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn json_value(value: serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }

    pub fn empty() -> Self {
        Self::new(200, Bytes::new())
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Target of the `rel="next"` entry of the `Link` header, if any.
    pub fn next_link(&self) -> Option<String> {
        next_link(self.header("link")?)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Pick the `rel="next"` URL out of an RFC 8288 `Link` value.
pub fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|entry| {
        let (target, params) = entry.split_once(';')?;
        let is_next = params.split(';').any(|p| {
            let p = p.trim().replace(' ', "");
            p == "rel=\"next\"" || p == "rel=next"
        });
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        is_next.then(|| target.to_string())
    })
}

/// Body chunks of a streamed answer, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

/// A successful answer whose body is read as it arrives.
pub struct HubStream {
    pub status: u16,
    /// Announced body size, when the server sent one.
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

impl HubStream {
    /// Wrap an already buffered answer.
    pub fn buffered(response: HubResponse) -> Self {
        let content_length = Some(response.body.len() as u64);
        Self {
            status: response.status,
            content_length,
            body: Box::pin(stream::once(async move { Ok(response.body) })),
        }
    }
}

impl std::fmt::Debug for HubStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubStream")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Capability every remote call goes through.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Perform the call. Non-2xx answers come back as [`TransportError`].
    async fn execute(&self, request: HubRequest) -> Result<HubResponse, TransportError>;

    /// Like [`execute`](Self::execute), but hands the body over chunk by chunk.
    ///
    /// Errors before the first byte are reported here; errors while reading
    /// arrive through the stream. The default buffers the whole body.
    async fn execute_stream(&self, request: HubRequest) -> Result<HubStream, TransportError> {
        Ok(HubStream::buffered(self.execute(request).await?))
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, request: HubRequest) -> Result<HubResponse, TransportError> {
        (**self).execute(request).await
    }

    async fn execute_stream(&self, request: HubRequest) -> Result<HubStream, TransportError> {
        (**self).execute_stream(request).await
    }
}
