//! In-memory [`Transport`] for tests.
//!
//! Records every request and replays scripted responses per method and path.
//! Unscripted reads answer `404`, unscripted writes answer `204`.

use crate::error::TransportError;
use crate::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use hyper::Method;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// One request seen by a [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl RecordedCall {
    /// `"PUT /drives/rootfs"`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

type Route = (Method, String);

#[derive(Debug, Default)]
struct State {
    once: HashMap<Route, VecDeque<Result<ApiResponse, TransportError>>>,
    sticky: HashMap<Route, ApiResponse>,
    unreachable: bool,
    calls: Vec<RecordedCall>,
}

/// Scriptable transport double. Clones share the same script and call log.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<State>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Answer every `method path` request with `status` and `body`.
    pub fn respond(&self, method: Method, path: &str, status: u16, body: impl Into<String>) {
        self.lock().sticky.insert(
            (method, path.to_string()),
            ApiResponse::new(status, body.into()),
        );
    }

    /// Answer the next `method path` request with `status` and `body`.
    pub fn respond_once(&self, method: Method, path: &str, status: u16, body: impl Into<String>) {
        self.lock()
            .once
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Ok(ApiResponse::new(status, body.into())));
    }

    /// Fail the next `method path` request with `error`.
    pub fn fail_once(&self, method: Method, path: &str, error: TransportError) {
        self.lock()
            .once
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Err(error));
    }

    /// Fail every request as if the API socket did not exist.
    pub fn unreachable(&self) {
        self.lock().unreachable = true;
    }

    /// All requests so far, in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// `"METHOD path"` labels of all requests so far.
    pub fn trace(&self) -> Vec<String> {
        self.lock().calls.iter().map(RecordedCall::label).collect()
    }

    /// Labels of state-changing requests only.
    pub fn writes(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.method != Method::GET)
            .map(RecordedCall::label)
            .collect()
    }

    /// Body of the most recent `method path` request.
    pub fn last_body(&self, method: Method, path: &str) -> Option<serde_json::Value> {
        self.lock()
            .calls
            .iter()
            .rev()
            .find(|call| call.method == method && call.path == path)
            .and_then(|call| call.body.clone())
    }

    /// Forget recorded calls, keeping the script.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let mut state = self.lock();
        state.calls.push(RecordedCall {
            method: request.method.clone(),
            path: request.path.clone(),
            body: request
                .body
                .as_ref()
                .and_then(|body| serde_json::from_slice(body).ok()),
        });

        if state.unreachable {
            return Err(TransportError::Connect {
                endpoint: "unix:///recording.sock".to_string(),
                reason: "connection refused".to_string(),
            });
        }

        let route = (request.method.clone(), request.path.clone());
        if let Some(next) = state.once.get_mut(&route).and_then(VecDeque::pop_front) {
            return next;
        }
        if let Some(response) = state.sticky.get(&route) {
            return Ok(response.clone());
        }
        Ok(if request.method == Method::GET {
            ApiResponse::new(404, String::new())
        } else {
            ApiResponse::new(204, String::new())
        })
    }
}
