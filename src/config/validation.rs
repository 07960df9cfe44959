//! Configuration validation.
//!
//! Serde handles the syntax; this checks that header names and values are
//! legal on the wire and that numeric settings are usable. Every problem is
//! reported, not just the first one.

use std::fmt;
use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};

use crate::config::schema::TraceConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `correlation.header`.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting all errors.
pub fn validate_config(config: &TraceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.shutdown_timeout_secs",
            "must be greater than zero",
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    if HeaderName::try_from(config.correlation.header.as_str()).is_err() {
        errors.push(ValidationError::new(
            "correlation.header",
            format!("'{}' is not a valid header name", config.correlation.header),
        ));
    }
    let mirror = config.correlation.mirror_header.as_str();
    if !mirror.is_empty() && HeaderName::try_from(mirror).is_err() {
        errors.push(ValidationError::new(
            "correlation.mirror_header",
            format!("'{mirror}' is not a valid header name"),
        ));
    }

    if config.logging.level.trim().is_empty() {
        errors.push(ValidationError::new("logging.level", "must not be empty"));
    }

    let user_agent = config.client.user_agent.as_str();
    if !user_agent.is_empty() && HeaderValue::from_str(user_agent).is_err() {
        errors.push(ValidationError::new(
            "client.user_agent",
            "contains characters not allowed in a header value",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&TraceConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_error() {
        let mut config = TraceConfig::default();
        config.listener.bind_address = "not an address".into();
        config.correlation.header = "bad header".into();
        config.correlation.mirror_header = "also bad\n".into();
        config.client.user_agent = "svc\u{7f}".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "correlation.header",
                "correlation.mirror_header",
                "client.user_agent",
            ]
        );
    }

    #[test]
    fn empty_mirror_header_is_allowed() {
        let mut config = TraceConfig::default();
        config.correlation.mirror_header = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
