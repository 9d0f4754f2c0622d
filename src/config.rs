// ============================================================================
// Engine Configuration
// ============================================================================
//
// Constructor parameters for the push and feedback engines, with defaults
// for the well-known APNS endpoints. Supports loading from environment
// variables for hosts that configure that way.
//
// ============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const APNS_GATEWAY_HOST: &str = "gateway.push.apple.com";
pub const APNS_GATEWAY_SANDBOX_HOST: &str = "gateway.sandbox.push.apple.com";
pub const APNS_GATEWAY_PORT: u16 = 2195;

pub const APNS_FEEDBACK_HOST: &str = "feedback.push.apple.com";
pub const APNS_FEEDBACK_SANDBOX_HOST: &str = "feedback.sandbox.push.apple.com";
pub const APNS_FEEDBACK_PORT: u16 = 2196;

/// Seconds to wait before retrying a failed gateway connection.
pub const DEFAULT_CONNECT_RETRY_TIMEOUT: i64 = 60;

/// Seconds between delivery statistics log lines.
pub const DEFAULT_STATS_INTERVAL: i64 = 3600;

/// Seconds between polls of the feedback service.
pub const DEFAULT_FEEDBACK_INTERVAL: i64 = 3600;

/// APNS environment. Selects which pair of Apple endpoints the default
/// configurations point at; the engines themselves only see a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Push gateway endpoint for this environment.
    pub fn gateway(&self) -> (&'static str, u16) {
        match self {
            Environment::Development => (APNS_GATEWAY_SANDBOX_HOST, APNS_GATEWAY_PORT),
            Environment::Production => (APNS_GATEWAY_HOST, APNS_GATEWAY_PORT),
        }
    }

    /// Feedback service endpoint for this environment.
    pub fn feedback(&self) -> (&'static str, u16) {
        match self {
            Environment::Development => (APNS_FEEDBACK_SANDBOX_HOST, APNS_FEEDBACK_PORT),
            Environment::Production => (APNS_FEEDBACK_HOST, APNS_FEEDBACK_PORT),
        }
    }
}

/// Configuration for [`crate::push::PushEngine`].
#[derive(Clone, Debug)]
pub struct PushConfig {
    pub host: String,
    pub port: u16,
    /// Client certificate, PEM.
    pub cert_file: String,
    /// Private key matching the certificate, PEM.
    pub key_file: String,
    /// Directory of trusted CA certificates.
    pub ca_path: String,
    /// Seconds of inactivity before the connection is dropped. 0 keeps
    /// the connection open indefinitely.
    pub timeout: i64,
    pub connect_retry_timeout: i64,
    pub log_stats_interval: i64,
}

impl PushConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        cert_file: impl Into<String>,
        key_file: impl Into<String>,
        ca_path: impl Into<String>,
        timeout: i64,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ca_path: ca_path.into(),
            timeout,
            connect_retry_timeout: DEFAULT_CONNECT_RETRY_TIMEOUT,
            log_stats_interval: DEFAULT_STATS_INTERVAL,
        }
    }

    /// Configuration pointed at the Apple gateway for `environment`.
    pub fn for_environment(
        environment: Environment,
        cert_file: impl Into<String>,
        key_file: impl Into<String>,
        ca_path: impl Into<String>,
        timeout: i64,
    ) -> Self {
        let (host, port) = environment.gateway();
        Self::new(host, port, cert_file, key_file, ca_path, timeout)
    }

    pub fn from_env() -> Result<Self> {
        let host = std::env::var("APNS_GATEWAY_HOST")
            .unwrap_or_else(|_| APNS_GATEWAY_HOST.to_string());
        let port = std::env::var("APNS_GATEWAY_PORT")
            .unwrap_or_else(|_| APNS_GATEWAY_PORT.to_string())
            .parse()
            .context("APNS_GATEWAY_PORT must be a port number")?;
        let cert_file =
            std::env::var("APNS_CERT_FILE").context("APNS_CERT_FILE must be set")?;
        let key_file = std::env::var("APNS_KEY_FILE").context("APNS_KEY_FILE must be set")?;
        let ca_path = std::env::var("APNS_CA_PATH").context("APNS_CA_PATH must be set")?;
        let timeout = std::env::var("APNS_IDLE_TIMEOUT")
            .unwrap_or_else(|_| "0".to_string())
            .parse()
            .context("APNS_IDLE_TIMEOUT must be a number of seconds")?;

        Ok(Self::new(host, port, cert_file, key_file, ca_path, timeout))
    }
}

/// Configuration for [`crate::feedback::FeedbackEngine`].
#[derive(Clone, Debug)]
pub struct FeedbackConfig {
    pub host: String,
    pub port: u16,
    pub cert_file: String,
    pub key_file: String,
    pub ca_path: String,
    /// Seconds between polls of the feedback service.
    pub poll_interval: i64,
}

impl FeedbackConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        cert_file: impl Into<String>,
        key_file: impl Into<String>,
        ca_path: impl Into<String>,
        poll_interval: i64,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            cert_file: cert_file.into(),
            key_file: key_file.into(),
            ca_path: ca_path.into(),
            poll_interval,
        }
    }

    pub fn for_environment(
        environment: Environment,
        cert_file: impl Into<String>,
        key_file: impl Into<String>,
        ca_path: impl Into<String>,
        poll_interval: i64,
    ) -> Self {
        let (host, port) = environment.feedback();
        Self::new(host, port, cert_file, key_file, ca_path, poll_interval)
    }

    pub fn from_env() -> Result<Self> {
        let host = std::env::var("APNS_FEEDBACK_HOST")
            .unwrap_or_else(|_| APNS_FEEDBACK_HOST.to_string());
        let port = std::env::var("APNS_FEEDBACK_PORT")
            .unwrap_or_else(|_| APNS_FEEDBACK_PORT.to_string())
            .parse()
            .context("APNS_FEEDBACK_PORT must be a port number")?;
        let cert_file =
            std::env::var("APNS_CERT_FILE").context("APNS_CERT_FILE must be set")?;
        let key_file = std::env::var("APNS_KEY_FILE").context("APNS_KEY_FILE must be set")?;
        let ca_path = std::env::var("APNS_CA_PATH").context("APNS_CA_PATH must be set")?;
        let poll_interval = std::env::var("APNS_FEEDBACK_INTERVAL")
            .unwrap_or_else(|_| DEFAULT_FEEDBACK_INTERVAL.to_string())
            .parse()
            .context("APNS_FEEDBACK_INTERVAL must be a number of seconds")?;

        Ok(Self::new(host, port, cert_file, key_file, ca_path, poll_interval))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_endpoints() {
        assert_eq!(
            Environment::Production.gateway(),
            ("gateway.push.apple.com", 2195)
        );
        assert_eq!(
            Environment::Development.gateway(),
            ("gateway.sandbox.push.apple.com", 2195)
        );
        assert_eq!(
            Environment::Production.feedback(),
            ("feedback.push.apple.com", 2196)
        );
        assert_eq!(
            Environment::Development.feedback(),
            ("feedback.sandbox.push.apple.com", 2196)
        );
    }

    #[test]
    fn test_push_config_defaults() {
        let config = PushConfig::new("localhost", 2195, "cert.pem", "key.pem", "/etc/ssl/certs", 0);
        assert_eq!(config.connect_retry_timeout, DEFAULT_CONNECT_RETRY_TIMEOUT);
        assert_eq!(config.log_stats_interval, DEFAULT_STATS_INTERVAL);
    }

    #[test]
    fn test_for_environment_picks_endpoint() {
        let config = PushConfig::for_environment(
            Environment::Development,
            "cert.pem",
            "key.pem",
            "/etc/ssl/certs",
            300,
        );
        assert_eq!(config.host, APNS_GATEWAY_SANDBOX_HOST);
        assert_eq!(config.port, APNS_GATEWAY_PORT);
        assert_eq!(config.timeout, 300);
    }
}
