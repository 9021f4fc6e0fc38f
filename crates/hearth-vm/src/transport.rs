//! HTTP transport to the Firecracker API socket.
//!
//! [`Transport`] is the single call contract used by the configurator and the
//! reconciler. [`HttpTransport`] performs one request/response cycle with a
//! timeout; retries are layered on top by [`crate::RetryTransport`].

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use hyperlocal::UnixConnector;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Default Firecracker API socket.
pub const DEFAULT_SOCKET_PATH: &str = "/tmp/firecracker.socket";

/// One request against the Firecracker API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Bytes>,
}

impl ApiRequest {
    /// `GET {path}` without a body.
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    /// `PUT {path}` with a JSON body.
    pub fn put_json<T: Serialize + ?Sized>(
        path: impl Into<String>,
        body: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method: Method::PUT,
            path: path.into(),
            body: Some(Bytes::from(serde_json::to_vec(body)?)),
        })
    }

    /// Whether repeating the request cannot change remote state.
    pub fn is_idempotent(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }
}

/// Status and body of an API response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Performs one HTTP request/response cycle against the Firecracker API.
///
/// Implementations must be safe to share between concurrent provisioning
/// runs.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request` and return the response, whatever its status.
    ///
    /// # Errors
    /// Returns [`TransportError`] when no response was received.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        (**self).send(request).await
    }
}

/// Where the Firecracker API listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// API socket path (`unix:///run/fc.sock` or `/run/fc.sock`)
    Unix(PathBuf),
    /// TCP base URL without trailing slash (`http://127.0.0.1:8080`)
    Http(String),
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(path) = s.strip_prefix("unix://") {
            if path.is_empty() {
                return Err(TransportError::InvalidEndpoint(s.to_string()));
            }
            return Ok(Endpoint::Unix(PathBuf::from(path)));
        }
        if s.starts_with('/') {
            return Ok(Endpoint::Unix(PathBuf::from(s)));
        }
        if s.starts_with("http://") {
            let base = s.trim_end_matches('/');
            base.parse::<hyper::Uri>()
                .map_err(|_| TransportError::InvalidEndpoint(s.to_string()))?;
            return Ok(Endpoint::Http(base.to_string()));
        }
        Err(TransportError::InvalidEndpoint(s.to_string()))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
            Endpoint::Http(base) => write!(f, "{base}"),
        }
    }
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// API endpoint
    pub endpoint: Endpoint,
    /// Per-request timeout, covering connect, send and body read
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First backoff interval
    pub retry_wait_min: Duration,
    /// Backoff interval cap
    pub retry_wait_max: Duration,
    /// Idle connections kept per host
    pub pool_max_idle_per_host: usize,
    /// How long an idle pooled connection is kept
    pub pool_idle_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            request_timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_wait_min: Duration::from_secs(1),
            retry_wait_max: Duration::from_secs(5),
            pool_max_idle_per_host: 20,
            pool_idle_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone)]
enum HttpClient {
    Unix(Client<UnixConnector>),
    Tcp(Client<HttpConnector>),
}

/// hyper client bound to one Firecracker API endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: HttpClient,
    endpoint: Endpoint,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build the client and its connection pool. No connection is opened
    /// until the first request.
    pub fn new(config: &TransportConfig) -> Self {
        let mut builder = Client::builder();
        builder
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(config.pool_idle_timeout);

        let client = match &config.endpoint {
            Endpoint::Unix(_) => HttpClient::Unix(builder.build(UnixConnector)),
            Endpoint::Http(_) => {
                let mut connector = HttpConnector::new();
                connector.set_connect_timeout(Some(config.request_timeout));
                HttpClient::Tcp(builder.build(connector))
            }
        };

        Self {
            client,
            endpoint: config.endpoint.clone(),
            request_timeout: config.request_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn uri(&self, path: &str) -> Result<hyper::Uri, TransportError> {
        match &self.endpoint {
            Endpoint::Unix(socket_path) => Ok(hyperlocal::Uri::new(socket_path, path).into()),
            Endpoint::Http(base) => format!("{base}{path}")
                .parse()
                .map_err(|e| TransportError::Request {
                    path: path.to_string(),
                    reason: format!("invalid URI: {e}"),
                }),
        }
    }

    fn classify(&self, path: &str, error: hyper::Error) -> TransportError {
        if error.is_connect() {
            TransportError::Connect {
                endpoint: self.endpoint.to_string(),
                reason: error.to_string(),
            }
        } else {
            TransportError::Request {
                path: path.to_string(),
                reason: error.to_string(),
            }
        }
    }

    async fn round_trip(
        &self,
        request: Request<Body>,
        path: &str,
    ) -> Result<ApiResponse, TransportError> {
        let response = match &self.client {
            HttpClient::Unix(client) => client.request(request).await,
            HttpClient::Tcp(client) => client.request(request).await,
        }
        .map_err(|e| self.classify(path, e))?;

        let status = response.status().as_u16();
        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| TransportError::Request {
                path: path.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let start = Instant::now();
        let ApiRequest { method, path, body } = request;
        tracing::debug!(%method, path = %path, endpoint = %self.endpoint, "Sending Firecracker API request");

        let builder = Request::builder()
            .method(method.clone())
            .uri(self.uri(&path)?)
            .header("Accept", "application/json");
        let http_request = match body {
            Some(payload) => {
                tracing::trace!(payload = %String::from_utf8_lossy(&payload), "request body");
                builder
                    .header("Content-Type", "application/json")
                    .body(Body::from(payload))
            }
            None => builder.body(Body::empty()),
        }
        .map_err(|e| TransportError::Request {
            path: path.clone(),
            reason: format!("failed to build request: {e}"),
        })?;

        let response = timeout(self.request_timeout, self.round_trip(http_request, &path))
            .await
            .map_err(|_| TransportError::Timeout {
                path: path.clone(),
                timeout: self.request_timeout,
            })??;

        tracing::debug!(
            %method,
            path = %path,
            status = response.status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Firecracker API responded"
        );
        Ok(response)
    }
}
