//! Retry decorator for a [`Transport`].
//!
//! Firecracker has no idempotency keys, so a state-changing request whose
//! delivery is uncertain is never repeated. Reads are retried on any
//! transport failure and on 5xx responses; writes only when the connection
//! could not be established.

use crate::error::TransportError;
use crate::transport::{ApiRequest, ApiResponse, Transport, TransportConfig};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::time::Duration;

/// Exponential backoff with a bounded number of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// First wait
    pub wait_min: Duration,
    /// Wait cap
    pub wait_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TransportConfig::default())
    }
}

impl From<&TransportConfig> for RetryPolicy {
    fn from(config: &TransportConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            wait_min: config.retry_wait_min,
            wait_max: config.retry_wait_max,
        }
    }
}

impl RetryPolicy {
    /// A policy that sends every request exactly once.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.wait_min)
            .with_max_interval(self.wait_max)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Why an attempt is being repeated.
enum Retryable {
    Failed(TransportError),
    ServerError(ApiResponse),
}

/// Wraps a transport and repeats requests according to a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryTransport<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

#[async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let idempotent = request.is_idempotent();
        let max_attempts = self.policy.max_retries.saturating_add(1);
        let mut attempts = 0u32;

        let operation = || {
            attempts += 1;
            let attempt = attempts;
            let request = request.clone();
            async move {
                let can_retry = attempt < max_attempts;
                match self.inner.send(request).await {
                    Ok(response) if idempotent && response.status >= 500 && can_retry => {
                        Err(backoff::Error::transient(Retryable::ServerError(response)))
                    }
                    Ok(response) => Ok(response),
                    Err(e) if can_retry && (idempotent || e.is_connect()) => {
                        Err(backoff::Error::transient(Retryable::Failed(e)))
                    }
                    Err(e) => Err(backoff::Error::permanent(Retryable::Failed(e))),
                }
            }
        };

        let notify = |cause: Retryable, wait: Duration| match cause {
            Retryable::Failed(e) => tracing::warn!(
                method = %request.method,
                path = %request.path,
                error = %e,
                wait_ms = wait.as_millis() as u64,
                "Firecracker API request failed, retrying"
            ),
            Retryable::ServerError(response) => tracing::warn!(
                method = %request.method,
                path = %request.path,
                status = response.status,
                wait_ms = wait.as_millis() as u64,
                "Firecracker API server error, retrying"
            ),
        };

        match backoff::future::retry_notify(self.policy.backoff(), operation, notify).await {
            Ok(response) => Ok(response),
            Err(Retryable::Failed(e)) => Err(e),
            Err(Retryable::ServerError(response)) => Ok(response),
        }
    }
}
