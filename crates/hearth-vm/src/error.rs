//! Error types for hearth-vm.

use crate::models::Component;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for hearth-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur while provisioning or inspecting a VM.
#[derive(Debug, Error)]
pub enum VmError {
    /// The VM configuration is malformed or incomplete. Raised before any
    /// request reaches the Firecracker API.
    #[error("invalid VM configuration: {0}")]
    Validation(String),

    /// The request never produced an HTTP response.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The Firecracker API rejected a sub-resource payload.
    #[error("failed to configure {component}: status={status}, response={body}")]
    Configuration {
        /// Sub-resource that was being applied
        component: Component,
        /// HTTP status returned by the API
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A read returned a status that is neither success nor a known gap.
    #[error("unexpected response from {path}: status={status}, body={body}")]
    UnexpectedResponse {
        /// Request path
        path: String,
        /// HTTP status returned by the API
        status: u16,
        /// Raw response body
        body: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection-level failures from the Firecracker API transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The socket or host could not be reached; the request was never sent.
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect {
        /// Endpoint the transport is bound to
        endpoint: String,
        /// Underlying error message
        reason: String,
    },

    /// No response arrived within the request timeout.
    #[error("request to {path} timed out after {timeout:?}")]
    Timeout {
        /// Request path
        path: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// The request was sent (or partially sent) and then failed.
    #[error("request to {path} failed: {reason}")]
    Request {
        /// Request path
        path: String,
        /// Underlying error message
        reason: String,
    },

    /// The configured endpoint could not be parsed.
    #[error("invalid endpoint {0:?}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// Whether the failure happened before the request left the host.
    ///
    /// Only these failures are safe to retry for state-changing calls.
    pub fn is_connect(&self) -> bool {
        matches!(self, TransportError::Connect { .. })
    }
}
