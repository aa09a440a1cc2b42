//! Client configuration.
//!
//! Resolution order for each setting:
//! 1. Explicit builder calls
//! 2. `JPSERVE_HOST`, `JPSERVE_PORT`, `JPSERVE_TIMEOUT_SECS` (via [`ClientConfig::from_env`])
//! 3. Defaults (`localhost:8888`, no request deadline)

use std::time::Duration;

use thiserror::Error;

/// Default JPServe host.
pub const DEFAULT_HOST: &str = "localhost";

/// Default JPServe listening port.
pub const DEFAULT_PORT: u16 = 8888;

const ENV_HOST: &str = "JPSERVE_HOST";
const ENV_PORT: &str = "JPSERVE_PORT";
const ENV_TIMEOUT_SECS: &str = "JPSERVE_TIMEOUT_SECS";

/// Invalid configuration value.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid {key} value: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Settings used to open a [`ServeContext`](crate::ServeContext).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Deadline for one round trip. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            request_timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            request_timeout: None,
        }
    }

    /// Load settings from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Set the round-trip deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// `host:port` form used for connecting and in log output.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup(ENV_HOST).filter(|h| !h.trim().is_empty()) {
            config.host = host.trim().to_string();
        }

        if let Some(port) = lookup(ENV_PORT) {
            config.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_PORT,
                    value: port.clone(),
                })?;
        }

        if let Some(secs) = lookup(ENV_TIMEOUT_SECS) {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: ENV_TIMEOUT_SECS,
                    value: secs.clone(),
                })?;
            // 0 disables the deadline
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.endpoint(), "localhost:8888");
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("JPSERVE_HOST", "10.0.0.5"),
            ("JPSERVE_PORT", "9000"),
            ("JPSERVE_TIMEOUT_SECS", "15"),
        ]))
        .unwrap();
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 9000);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(15)));
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config =
            ClientConfig::from_lookup(lookup_from(&[("JPSERVE_TIMEOUT_SECS", "0")])).unwrap();
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_invalid_port_is_reported() {
        let err = ClientConfig::from_lookup(lookup_from(&[("JPSERVE_PORT", "eighty")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid JPSERVE_PORT value: eighty");
    }

    #[test]
    fn test_with_timeout() {
        let config = ClientConfig::new("example", 1).with_timeout(Duration::from_millis(250));
        assert_eq!(config.request_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.endpoint(), "example:1");
    }
}
