//! Drive open API client with request/response handling.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::api::error::{ApiErrorCode, ErrorBody, classify};
use crate::error::{DriveError, Result};
use crate::http::HttpClient;

/// JSON client for the open API host.
///
/// Adds the bearer token, applies a per-call timeout and maps error bodies to
/// [`DriveError`]. Retries happen one layer below, in [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    timeout: Duration,
}

impl ApiClient {
    pub fn new(http: HttpClient, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body to `path` and decode the response.
    pub async fn post<B, T>(&self, path: &str, token: Option<&str>, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = serde_json::to_vec(body)?;
        // Token exchanges carry the client secret and refresh token.
        let loggable = !path.starts_with("/oauth");

        let request_body = if loggable {
            String::from_utf8_lossy(&payload).into_owned()
        } else {
            String::new()
        };
        debug!(path, body = %request_body, "api request");

        let mut builder = self
            .http
            .post(&self.url(path))
            .header(CONTENT_TYPE, "application/json")
            .body(payload);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(path, builder, &request_body).await
    }

    /// GET `path` and decode the response.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T> {
        debug!(path, "api request");
        let mut builder = self.http.get(&self.url(path));
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(path, builder, "").await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        path: &str,
        builder: reqwest::RequestBuilder,
        request_body: &str,
    ) -> Result<T> {
        let response = timeout(self.timeout, self.http.execute(builder))
            .await
            .map_err(|_| DriveError::Custom(format!("Request to {} timed out", path)))??;

        let status = response.status().as_u16();
        let bytes = timeout(self.timeout, response.bytes())
            .await
            .map_err(|_| DriveError::Custom(format!("Reading {} timed out", path)))??;

        if status >= 300 {
            let err = classify(status, path, &bytes);
            if !err.is_not_found() {
                let code = serde_json::from_slice::<ErrorBody>(&bytes)
                    .map(|b| ApiErrorCode::from(b.code.as_str()))
                    .unwrap_or(ApiErrorCode::Unknown);
                warn!(
                    path,
                    status,
                    code = code.description(),
                    request = request_body,
                    response = %String::from_utf8_lossy(&bytes),
                    "api call failed"
                );
            }
            return Err(err);
        }

        debug!(path, status, bytes = bytes.len(), "api response");
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
