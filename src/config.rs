//! Configuration management for the streaming relay

use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Configuration for the relay service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the HTTP server binds to (default: 0.0.0.0:8080)
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Path prefix prepended to proxied URLs written into rewritten
    /// manifests, e.g. "/api" when the service is mounted behind a gateway
    /// (default: empty, endpoints at the root)
    #[serde(default)]
    pub public_prefix: String,

    /// User-Agent sent on all upstream requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Timeout for size probes (HEAD and `bytes=0-0`), in seconds.
    /// Deliberately short so an uncooperative origin cannot stall the
    /// request pipeline (default: 5)
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout for the main upstream fetch to produce response headers, in
    /// seconds (default: 8). Does not bound the body transfer.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Window served for an open-ended range when the upstream total size is
    /// unknown (default: 256KiB)
    #[serde(default = "default_window_bytes")]
    pub default_window_bytes: u64,

    /// Maximum redirects followed on upstream requests (default: 5)
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// HS256 secret for verifying bearer tokens. The JWT_SECRET environment
    /// variable takes precedence. Without a secret all tokens are treated as
    /// unverifiable and requests proceed anonymously.
    #[serde(default)]
    pub jwt_secret: Option<String>,

    /// Optional YAML file holding the static course catalog used by the
    /// binary. Production deployments replace this with a real catalog
    /// implementation.
    #[serde(default)]
    pub catalog_file: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_address: default_listen_address(),
            public_prefix: String::new(),
            user_agent: default_user_agent(),
            probe_timeout_secs: default_probe_timeout(),
            fetch_timeout_secs: default_fetch_timeout(),
            default_window_bytes: default_window_bytes(),
            max_redirects: default_max_redirects(),
            jwt_secret: None,
            catalog_file: None,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            RelayError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let config: RelayConfig = serde_yaml::from_str(&content)
            .map_err(|e| RelayError::ConfigError(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.listen_address.parse::<SocketAddr>().map_err(|e| {
            RelayError::ConfigError(format!(
                "Invalid listen_address '{}': {}",
                self.listen_address, e
            ))
        })?;

        if self.probe_timeout_secs == 0 {
            return Err(RelayError::ConfigError(
                "probe_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.fetch_timeout_secs == 0 {
            return Err(RelayError::ConfigError(
                "fetch_timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.default_window_bytes == 0 {
            return Err(RelayError::ConfigError(
                "default_window_bytes must be greater than zero".to_string(),
            ));
        }

        if !self.public_prefix.is_empty() && !self.public_prefix.starts_with('/') {
            return Err(RelayError::ConfigError(format!(
                "public_prefix must start with '/', got '{}'",
                self.public_prefix
            )));
        }

        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The JWT secret, with the environment variable taking precedence over
    /// the config file.
    pub fn resolved_jwt_secret(&self) -> Option<String> {
        std::env::var("JWT_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .or_else(|| self.jwt_secret.clone())
    }
}

fn default_listen_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_user_agent() -> String {
    "stream-relay/0.1".to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_fetch_timeout() -> u64 {
    8
}

fn default_window_bytes() -> u64 {
    crate::range::DEFAULT_WINDOW_BYTES
}

fn default_max_redirects() -> usize {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_window_bytes, 262_144);
        assert_eq!(config.probe_timeout_secs, 5);
        assert_eq!(config.fetch_timeout_secs, 8);
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let config: RelayConfig = serde_yaml::from_str("listen_address: \"127.0.0.1:9000\"\n").unwrap();
        assert_eq!(config.listen_address, "127.0.0.1:9000");
        // Everything else falls back to defaults
        assert_eq!(config.max_redirects, 5);
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_invalid_listen_address_rejected() {
        let config = RelayConfig {
            listen_address: "not-an-address".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let config = RelayConfig {
            probe_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            fetch_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_prefix_must_be_rooted() {
        let config = RelayConfig {
            public_prefix: "api".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RelayConfig {
            public_prefix: "/api".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_errors() {
        let result = RelayConfig::from_file("/nonexistent/relay.yaml");
        assert!(matches!(result, Err(RelayError::ConfigError(_))));
    }
}
