//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the tracing layer.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for request tracing.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TraceConfig {
    /// Listener configuration (bind address, shutdown drain).
    pub listener: ListenerConfig,

    /// Correlation identifier header names.
    pub correlation: CorrelationConfig,

    /// Request logging settings.
    pub logging: LoggingConfig,

    /// Outbound client settings.
    pub client: ClientConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Seconds in-flight requests get to finish after a shutdown signal.
    pub shutdown_timeout_secs: u64,

    /// Request timeout applied by `HttpServer` in front of the handlers.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            shutdown_timeout_secs: 25,
            request_timeout_secs: 30,
        }
    }
}

/// Correlation identifier headers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Header read on inbound requests, written on responses and outbound calls.
    pub header: String,

    /// Second response header carrying the same value. Empty disables it.
    pub mirror_header: String,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            header: "x-request-id".to_string(),
            mirror_header: "x-unique-id".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for development.
    #[default]
    Text,
    /// One JSON object per line, for log shippers.
    Json,
}

/// Request logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log successful (< 300) requests too. Failures are always logged.
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error). `RUST_LOG` takes precedence.
    pub level: String,

    /// Output format of the subscriber.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Outbound client configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// User-Agent sent on downstream calls. Empty falls back to the
    /// process-wide value (`SERVICE_NAME` unless set at startup).
    pub user_agent: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TraceConfig::default();
        assert_eq!(config.correlation.header, "x-request-id");
        assert_eq!(config.correlation.mirror_header, "x-unique-id");
        assert_eq!(config.listener.shutdown_timeout_secs, 25);
        assert!(!config.logging.verbose);
        assert!(config.client.user_agent.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TraceConfig = toml::from_str(
            r#"
            [logging]
            verbose = true
            format = "json"
            "#,
        )
        .unwrap();

        assert!(config.logging.verbose);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.correlation.header, "x-request-id");
    }
}
