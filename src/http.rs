//! HTTP transport: retry policy, header normalization and raw content transfers.
//!
//! Every outbound request goes through [`HttpClient::execute`], which applies the
//! same pre-request header rules and the bounded retry policy. Download ranges and
//! upload parts bypass the JSON API and talk to pre-signed URLs directly.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HOST, HeaderValue, RANGE, REFERER};
use reqwest::{Client, Request, RequestBuilder, Response};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{DriveError, Result};

/// Sentinel content type: the header is removed right before sending.
///
/// Pre-signed upload URLs reject requests that carry an explicit content type.
pub const IGNORE_CONTENT_TYPE: &str = "[ignore]";

/// Stream of downloaded body chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Raw content transfers against pre-signed URLs.
#[async_trait]
pub trait ContentTransport: Send + Sync {
    /// GET `url` starting at byte `offset`, returning the body as a stream.
    async fn open_range(&self, url: &str, offset: u64) -> Result<ByteStream>;

    /// PUT everything received on `body` to `url`, completing when the sender side
    /// is dropped and the server has answered.
    async fn upload_part(&self, url: &str, body: mpsc::Receiver<Bytes>) -> Result<()>;
}

/// Anything carrying an HTTP status the retry policy can inspect.
pub trait HasStatus {
    fn status_code(&self) -> u16;
}

impl HasStatus for Response {
    fn status_code(&self) -> u16 {
        self.status().as_u16()
    }
}

/// Fixed-delay retry on rate limiting and server errors.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub rate_limit_delay: Duration,
    pub server_error_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_delay: Duration::from_secs(1),
            server_error_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Default delays with `max_attempts` total attempts (at least one).
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Delay before retrying a response with this status, or `None` if it is final.
    pub fn backoff(&self, status: u16) -> Option<Duration> {
        match status {
            429 => Some(self.rate_limit_delay),
            s if s >= 500 => Some(self.server_error_delay),
            _ => None,
        }
    }

    /// Drive `send` until it yields a non-retryable status or attempts run out.
    ///
    /// The last response is returned as-is, so callers still see the final status.
    pub async fn run<F, Fut, R>(&self, target: &str, mut send: F) -> Result<R>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<R>>,
        R: HasStatus,
    {
        let mut attempt = 1;
        loop {
            let response = send().await?;
            let status = response.status_code();
            match self.backoff(status) {
                Some(delay) if attempt < self.max_attempts => {
                    warn!(
                        path = target,
                        status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "request throttled or failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                _ => return Ok(response),
            }
        }
    }
}

/// HTTP client shared by the API client and the content transfers.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    policy: RetryPolicy,
    referer: HeaderValue,
}

impl HttpClient {
    /// Create a client sending `referer` by default.
    pub fn new(referer: &str, policy: RetryPolicy) -> Result<Self> {
        let referer = HeaderValue::from_str(referer)
            .map_err(|e| DriveError::InvalidArgument(format!("Invalid referer: {}", e)))?;

        let client = Client::builder()
            .user_agent(concat!("adrivefs/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            policy,
            referer,
        })
    }

    /// Start a GET request; send it with [`HttpClient::execute`].
    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    /// Start a POST request; send it with [`HttpClient::execute`].
    pub fn post(&self, url: &str) -> RequestBuilder {
        self.client.post(url)
    }

    /// Start a PUT request; send it with [`HttpClient::execute`].
    pub fn put(&self, url: &str) -> RequestBuilder {
        self.client.put(url)
    }

    /// Send a request through header normalization and the retry policy.
    ///
    /// Requests with a streamed body cannot be replayed and get a single attempt.
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response> {
        let mut request = builder.build()?;
        self.normalize_headers(&mut request);

        if request.try_clone().is_none() {
            return Ok(self.client.execute(request).await?);
        }

        let target = request.url().path().to_string();
        self.policy
            .run(&target, || {
                let attempt = request.try_clone();
                let client = self.client.clone();
                async move {
                    let attempt = attempt.ok_or_else(|| {
                        DriveError::Custom("Request body cannot be replayed".to_string())
                    })?;
                    Ok(client.execute(attempt).await?)
                }
            })
            .await
    }

    /// Apply the pre-request header rules: strip ignored content types, fill in
    /// `Host` from the URL and a default `Referer`.
    pub(crate) fn normalize_headers(&self, request: &mut Request) {
        let host = host_header(request.url());
        let headers = request.headers_mut();

        if headers
            .get(CONTENT_TYPE)
            .is_some_and(|v| v == IGNORE_CONTENT_TYPE)
        {
            headers.remove(CONTENT_TYPE);
        }

        if !headers.contains_key(HOST) {
            if let Some(value) = host.and_then(|h| HeaderValue::from_str(&h).ok()) {
                headers.insert(HOST, value);
            }
        }

        if !headers.contains_key(REFERER) {
            headers.insert(REFERER, self.referer.clone());
        }
    }
}

fn host_header(url: &reqwest::Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

#[async_trait]
impl ContentTransport for HttpClient {
    async fn open_range(&self, url: &str, offset: u64) -> Result<ByteStream> {
        let mut builder = self.get(url).header(ACCEPT, "*/*");
        if offset > 0 {
            builder = builder.header(RANGE, format!("bytes={}-", offset));
        }

        debug!(offset, "opening download range");
        let response = self.execute(builder).await?;
        let status = response.status().as_u16();
        if status >= 300 {
            // Drain for diagnostics; the body is never handed to the reader.
            let body = response.text().await.unwrap_or_default();
            warn!(status, body = %body, "open download url failed");
            return Err(DriveError::HttpStatus { status, body });
        }
        if offset > 0 && status == 200 {
            return Err(DriveError::Custom(
                "Server ignored the range request".to_string(),
            ));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DriveError::from))
            .boxed())
    }

    async fn upload_part(&self, url: &str, body: mpsc::Receiver<Bytes>) -> Result<()> {
        let stream = ReceiverStream::new(body).map(Ok::<Bytes, std::io::Error>);
        let builder = self
            .put(url)
            .header(CONTENT_TYPE, IGNORE_CONTENT_TYPE)
            .body(reqwest::Body::wrap_stream(stream));

        let response = self.execute(builder).await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if status >= 300 {
            warn!(status, body = %body, "upload part failed");
            return Err(DriveError::HttpStatus { status, body });
        }

        info!("upload part finished");
        Ok(())
    }
}
