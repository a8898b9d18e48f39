//! reqwest-backed transport talking to the real hub.

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE,
};
use tokio_util::io::ReaderStream;
use url::Url;

use super::{
    HubRequest, HubResponse, HubStream, RequestBody, Target, Transport, TransportError,
};

/// Default hub endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Longest error body we keep in an error message.
const MAX_ERROR_BODY: usize = 300;

/// Transport that performs real HTTPS calls.
///
/// Holds no domain state; each call is independent.
#[derive(Clone)]
pub struct HttpTransport {
    /// HTTP client for making requests
    http_client: reqwest::Client,
    /// Base URL every [`Target::Hub`] path is joined onto
    endpoint: Url,
    /// Deadline for buffered API calls
    timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for `endpoint`.
    ///
    /// `timeout` bounds connecting and every read. Buffered API calls must
    /// also finish within it; transfers may run as long as data keeps flowing.
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| TransportError::Network(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("hubdesk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint,
            timeout,
        })
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn resolve(&self, target: &Target) -> Result<Url, TransportError> {
        match target {
            Target::Hub(path) => self
                .endpoint
                .join(path.trim_start_matches('/'))
                .map_err(|e| TransportError::Network(format!("invalid path '{}': {}", path, e))),
            Target::Absolute(url) => Url::parse(url)
                .map_err(|e| TransportError::Network(format!("invalid url '{}': {}", url, e))),
        }
    }

    /// Build headers for one request.
    fn build_headers(request: &HubRequest) -> Result<HeaderMap, TransportError> {
        let mut headers = HeaderMap::new();

        if let Some(token) = &request.bearer {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| TransportError::Network(format!("invalid token: {}", e)))?,
            );
        }

        let content_type = match request.body {
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Ndjson(_) => Some("application/x-ndjson"),
            RequestBody::Bytes(_) | RequestBody::File(_) => Some("application/octet-stream"),
            RequestBody::Empty => None,
        };
        if let Some(content_type) = content_type {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        }

        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Network(format!("invalid header: {}", e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Network(format!("invalid header value: {}", e)))?;
            headers.insert(name, value);
        }

        Ok(headers)
    }
}

impl HttpTransport {
    /// Whether the whole call must finish within the client timeout.
    ///
    /// Large-object transfers and file bodies only get the per-read bound.
    fn has_deadline(request: &HubRequest) -> bool {
        matches!(request.target, Target::Hub(_))
            && !matches!(request.body, RequestBody::Bytes(_) | RequestBody::File(_))
    }

    /// Send `request` and check the status. The body is left unread.
    async fn send(
        &self,
        request: HubRequest,
        deadline: bool,
    ) -> Result<reqwest::Response, TransportError> {
        let url = self.resolve(&request.target)?;
        let headers = Self::build_headers(&request)?;

        let mut builder = self
            .http_client
            .request(request.method.clone(), url)
            .headers(headers);
        if deadline {
            builder = builder.timeout(self.timeout);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(value.to_string()),
            RequestBody::Ndjson(lines) => {
                let mut payload = String::new();
                for line in lines {
                    payload.push_str(&line.to_string());
                    payload.push('\n');
                }
                builder.body(payload)
            }
            RequestBody::Bytes(data) => builder.body(data),
            RequestBody::File(path) => {
                let unreadable =
                    |e: std::io::Error| TransportError::Local(format!("{}: {}", path.display(), e));
                let file = tokio::fs::File::open(&path).await.map_err(unreadable)?;
                let size = file.metadata().await.map_err(unreadable)?.len();
                builder
                    .header(CONTENT_LENGTH, size)
                    .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            }
        };

        let response = builder.send().await.map_err(network_error)?;

        // Check for errors
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::from_status(status, error_message(&body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: HubRequest) -> Result<HubResponse, TransportError> {
        let deadline = Self::has_deadline(&request);
        let response = self.send(request, deadline).await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                Some((name.as_str().to_string(), value.to_str().ok()?.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(network_error)?;
        Ok(HubResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_stream(&self, request: HubRequest) -> Result<HubStream, TransportError> {
        let response = self.send(request, false).await?;
        Ok(HubStream {
            status: response.status().as_u16(),
            content_length: response.content_length(),
            body: Box::pin(response.bytes_stream().map_err(network_error)),
        })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

fn network_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Network(format!("timed out: {}", err))
    } else {
        TransportError::Network(err.to_string())
    }
}

/// Pull the `error` field out of a JSON error body, else a trimmed body.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(message) = value.get("error").and_then(|v| v.as_str()) {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.len() <= MAX_ERROR_BODY {
        trimmed.to_string()
    } else {
        let mut end = MAX_ERROR_BODY;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &trimmed[..end])
    }
}
