//! Provider configuration.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `HEARTH_ENDPOINT` | `unix:///tmp/firecracker.socket` | Firecracker API socket or `http://` base URL |
//! | `HEARTH_TIMEOUT_SECS` | `30` | Per-request timeout |
//! | `HEARTH_MAX_RETRIES` | `3` | Retries after the first attempt |
//! | `HEARTH_RETRY_MIN_MS` | `1000` | First backoff interval |
//! | `HEARTH_RETRY_MAX_MS` | `5000` | Backoff interval cap |

use crate::error::{CoreError, Result};
use hearth_vm::{Endpoint, TransportConfig};
use std::str::FromStr;
use std::time::Duration;

/// Settings for one provider instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Transport and retry settings
    pub transport: TransportConfig,
}

impl ProviderConfig {
    /// Create a new config builder.
    pub fn builder() -> ProviderConfigBuilder {
        ProviderConfigBuilder::default()
    }

    /// Load configuration from `HEARTH_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    /// Fails when a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(endpoint) = parse_var::<Endpoint>(&lookup, "HEARTH_ENDPOINT")? {
            builder = builder.endpoint(endpoint);
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "HEARTH_TIMEOUT_SECS")? {
            builder = builder.request_timeout(Duration::from_secs(secs));
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "HEARTH_MAX_RETRIES")? {
            builder = builder.max_retries(retries);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HEARTH_RETRY_MIN_MS")? {
            builder = builder.retry_wait_min(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_var::<u64>(&lookup, "HEARTH_RETRY_MAX_MS")? {
            builder = builder.retry_wait_max(Duration::from_millis(ms));
        }
        builder.build()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let transport = &self.transport;
        if transport.request_timeout.is_zero() {
            return Err(CoreError::Config("request timeout must be > 0".into()));
        }
        if transport.retry_wait_min.is_zero() {
            return Err(CoreError::Config("retry_wait_min must be > 0".into()));
        }
        if transport.retry_wait_min > transport.retry_wait_max {
            return Err(CoreError::Config(format!(
                "retry_wait_min ({:?}) exceeds retry_wait_max ({:?})",
                transport.retry_wait_min, transport.retry_wait_max
            )));
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| CoreError::Config(format!("invalid {name}={raw:?}: {e}"))),
        _ => Ok(None),
    }
}

/// Builder for ProviderConfig.
#[derive(Debug, Default)]
pub struct ProviderConfigBuilder {
    config: ProviderConfig,
}

impl ProviderConfigBuilder {
    /// Set the API endpoint.
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.transport.endpoint = endpoint;
        self
    }

    /// Set the per-request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.transport.request_timeout = timeout;
        self
    }

    /// Set the number of retries after the first attempt.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.transport.max_retries = retries;
        self
    }

    /// Set the first backoff interval.
    pub fn retry_wait_min(mut self, wait: Duration) -> Self {
        self.config.transport.retry_wait_min = wait;
        self
    }

    /// Set the backoff interval cap.
    pub fn retry_wait_max(mut self, wait: Duration) -> Self {
        self.config.transport.retry_wait_max = wait;
        self
    }

    /// Build and validate the config.
    pub fn build(self) -> Result<ProviderConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(
            config.transport.endpoint,
            Endpoint::Unix(PathBuf::from("/tmp/firecracker.socket"))
        );
        assert_eq!(config.transport.request_timeout, Duration::from_secs(30));
        assert_eq!(config.transport.max_retries, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = ProviderConfig::builder()
            .endpoint(Endpoint::Http("http://127.0.0.1:8080".into()))
            .request_timeout(Duration::from_secs(5))
            .max_retries(0)
            .build()
            .unwrap();

        assert_eq!(config.transport.endpoint.to_string(), "http://127.0.0.1:8080");
        assert_eq!(config.transport.request_timeout, Duration::from_secs(5));
        assert_eq!(config.transport.max_retries, 0);
    }

    #[test]
    fn test_validation_rejects_inverted_backoff() {
        let result = ProviderConfig::builder()
            .retry_wait_min(Duration::from_secs(10))
            .retry_wait_max(Duration::from_secs(1))
            .build();
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let result = ProviderConfig::builder()
            .request_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_lookup_empty_is_default() {
        let config = ProviderConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ProviderConfig::default());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ProviderConfig::from_lookup(lookup(&[
            ("HEARTH_ENDPOINT", "unix:///run/fc/api.sock"),
            ("HEARTH_TIMEOUT_SECS", "10"),
            ("HEARTH_MAX_RETRIES", "5"),
            ("HEARTH_RETRY_MIN_MS", "200"),
            ("HEARTH_RETRY_MAX_MS", "800"),
        ]))
        .unwrap();

        let transport = config.transport;
        assert_eq!(transport.endpoint, Endpoint::Unix("/run/fc/api.sock".into()));
        assert_eq!(transport.request_timeout, Duration::from_secs(10));
        assert_eq!(transport.max_retries, 5);
        assert_eq!(transport.retry_wait_min, Duration::from_millis(200));
        assert_eq!(transport.retry_wait_max, Duration::from_millis(800));
    }

    #[test]
    fn test_from_lookup_blank_ignored() {
        let config = ProviderConfig::from_lookup(lookup(&[("HEARTH_MAX_RETRIES", "  ")])).unwrap();
        assert_eq!(config.transport.max_retries, 3);
    }

    #[test]
    fn test_from_lookup_invalid_value() {
        let err = ProviderConfig::from_lookup(lookup(&[("HEARTH_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("HEARTH_TIMEOUT_SECS"));

        let err = ProviderConfig::from_lookup(lookup(&[("HEARTH_ENDPOINT", "ftp://host")]))
            .unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
