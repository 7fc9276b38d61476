//! HTTP transport shared by the sync engine, auth client and offline cache.

mod api;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{compact_text, is_http_url};

pub use api::{
    PullResponse, PushEvent, PushRequest, PushResponse, PushResult, PushStatus, SyncApiClient,
    AUTH_TOKEN_PATH, PULL_PATH, PUSH_PATH,
};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// An outbound request relative to the configured API host.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    /// Path including any query string, e.g. `/api/sync/pull?since=`
    pub path: String,
    pub bearer: Option<String>,
    /// JSON body for `POST`
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn post_json<T: Serialize>(path: impl Into<String>, body: &T) -> Result<Self, TransportError> {
        let body = serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(Self {
            method: Method::Post,
            path: path.into(),
            bearer: None,
            body: Some(body),
        })
    }

    #[must_use]
    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    /// Path without the query string.
    pub fn route(&self) -> &str {
        self.path.split_once('?').map_or(self.path.as_str(), |(route, _)| route)
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("bearer", &self.bearer.as_ref().map(|_| "[REDACTED]"))
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish()
    }
}

/// A response of any status, as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn json_body<T: Serialize>(status: u16, body: &T) -> Result<Self, TransportError> {
        Ok(Self {
            status,
            content_type: Some("application/json".to_string()),
            body: serde_json::to_vec(body).map_err(|e| TransportError::Decode(e.to_string()))?,
        })
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Turn a non-2xx response into [`TransportError::Status`].
    pub fn error_for_status(self) -> Result<Self, TransportError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(TransportError::Status {
            status: self.status,
            message: parse_api_error(&self.body),
        })
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        serde_json::from_slice(&self.body).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Server unreachable: {0}")]
    Unreachable(String),
    #[error("Request timed out")]
    Timeout,
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Malformed response body: {0}")]
    Decode(String),
    #[error("Invalid network configuration: {0}")]
    InvalidConfiguration(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if error.is_builder() {
            Self::InvalidConfiguration(error.to_string())
        } else {
            Self::Unreachable(error.to_string())
        }
    }
}

/// Anything able to deliver an [`HttpRequest`].
#[allow(async_fn_in_trait)]
pub trait Network {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

impl<N: Network> Network for Arc<N> {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}

/// Real network backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestNetwork {
    base_url: String,
    client: Client,
}

impl ReqwestNetwork {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = normalize_base_url(base_url)?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidConfiguration(e.to_string()))?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl Network for ReqwestNetwork {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        tracing::debug!("{} {}", request.method.as_str(), request.route());
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await?.to_vec();
        tracing::debug!("{} {} -> {}", request.method.as_str(), request.route(), status);

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

pub fn normalize_base_url(url: &str) -> Result<String, TransportError> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(TransportError::InvalidConfiguration(
            "API base URL must not be empty".to_string(),
        ));
    }
    if !is_http_url(trimmed) {
        return Err(TransportError::InvalidConfiguration(
            "API base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    detail: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(body: &[u8]) -> String {
    if let Ok(payload) = serde_json::from_slice::<ApiErrorResponse>(body) {
        if let Some(message) = payload.detail.or(payload.message).or(payload.error) {
            return compact_text(&message);
        }
    }

    let text = compact_text(&String::from_utf8_lossy(body));
    if text.is_empty() {
        "empty response body".to_string()
    } else {
        text
    }
}
